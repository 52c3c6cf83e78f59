//! Cairn wire payloads — JSON messages exchanged over established links.
//!
//! The discovery handshake is the only payload required for correctness.
//! Receivers must treat unknown or malformed payloads as non-fatal no-ops:
//! they are logged and discarded, never an error, never a reason to close
//! the connection.

use serde::{Deserialize, Serialize};

use crate::peer::{PeerId, PeerRecord};

/// Wire format version carried in every discovery handshake.
/// A receiver seeing a higher version still parses the fields it knows.
pub const PROTOCOL_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

// ── Discovery handshake ───────────────────────────────────────────────────────

/// Payload exchanged immediately after a connection opens.
///
/// The connection initiator sends `Discovery` first; the accepting side
/// stores the sender's record and does not reply. `Disconnect` is reserved
/// on the wire and never emitted — receipt is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiscoveryMessage {
    Discovery {
        #[serde(default = "default_version")]
        version: u32,
        sender: PeerRecord,
    },
    Disconnect,
}

impl DiscoveryMessage {
    /// Handshake carrying the local profile.
    pub fn discovery(sender: PeerRecord) -> Self {
        Self::Discovery {
            version: PROTOCOL_VERSION,
            sender,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // Serialization of these payloads cannot fail: no maps, no non-string keys.
        serde_json::to_vec(self).expect("discovery message serializes")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ── QR connect payload ────────────────────────────────────────────────────────

/// Advertised validity window for a scanned QR payload: 5 minutes.
pub const QR_VALIDITY_MS: u64 = 5 * 60 * 1000;

/// Connect-by-QR token: the local peer id plus a creation timestamp.
///
/// Expiry is advisory — enforcement belongs to the consumer that scans the
/// code, via [`QrPayload::is_expired`]. The core never checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    pub peer_id: PeerId,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl QrPayload {
    pub const KIND: &'static str = "peer-connect";

    pub fn new(peer_id: PeerId, timestamp: u64) -> Self {
        Self {
            peer_id,
            timestamp,
            kind: Self::KIND.to_string(),
        }
    }

    /// True once the validity window has passed relative to `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > QR_VALIDITY_MS
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("qr payload serializes")
    }

    pub fn decode(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
