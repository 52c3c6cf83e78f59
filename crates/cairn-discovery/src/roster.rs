//! Roster — the live map of peer id → last-known presence record.
//!
//! Entries are replaced wholesale on every discovery handshake; the roster
//! never merges fields from two handshakes.

use std::sync::Arc;

use dashmap::DashMap;

use cairn_core::{PeerId, PeerRecord};

/// The discovery state, shared across tasks. Keyed on peer id.
pub type Roster = Arc<DashMap<PeerId, PeerRecord>>;

/// Create a new empty roster.
pub fn new_roster() -> Roster {
    Arc::new(DashMap::new())
}

/// Snapshot of the roster, in map order (unspecified).
pub fn snapshot(roster: &Roster) -> Vec<PeerRecord> {
    roster.iter().map(|e| e.value().clone()).collect()
}
