//! cairn-core — shared types, wire payloads, and configuration.
//! All other Cairn crates depend on this one.

pub mod config;
pub mod error;
pub mod peer;
pub mod wire;

pub use error::{DiscoveryError, SignalingError};
pub use peer::{now_ms, ConnectionMedium, LocalIdentity, PeerId, PeerRecord};
pub use wire::{DiscoveryMessage, QrPayload, PROTOCOL_VERSION};
