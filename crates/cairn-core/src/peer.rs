//! Peer identity and presence types.
//!
//! A `PeerId` is allocated by the signaling broker, not chosen locally, and
//! doubles as the application-visible user id for the session's lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Broker-allocated peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a peer is reachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMedium {
    /// Direct logical link through the signaling broker.
    DirectLink,
    /// Short-range radio (BLE-class) link.
    ShortRangeRadio,
    /// Multi-hop relay through the mesh.
    RelayMesh,
    /// Not currently reachable.
    #[default]
    None,
}

/// The running instance's own identity and display profile.
///
/// The id is assigned during `initialize` and is immutable until teardown.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub id: PeerId,
    pub name: String,
    pub avatar: Option<String>,
}

impl LocalIdentity {
    /// The profile as sent in a discovery handshake.
    pub fn as_record(&self) -> PeerRecord {
        PeerRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            distance: None,
            last_seen: now_ms(),
            medium: ConnectionMedium::DirectLink,
        }
    }
}

/// A remote user's last-known presence.
///
/// Keyed by `id` in the roster. Replaced wholesale when a newer discovery
/// handshake for the same id arrives — never merged field-by-field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Approximate distance in meters. Simulated; assigned by the receiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
    /// Unix timestamp in milliseconds.
    pub last_seen: u64,
    #[serde(default)]
    pub medium: ConnectionMedium,
}

/// Current unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
