//! Error taxonomy.
//!
//! Nothing here is fatal to the process: every failure is scoped to a single
//! operation or a single connection. Malformed inbound payloads are not
//! represented — they are discarded where they are parsed and never surface.

use crate::peer::PeerId;

/// Failures crossing the signaling boundary.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// The broker could not allocate an identity or is unreachable.
    #[error("signaling broker unavailable: {0}")]
    Unavailable(String),
    /// An outbound dial was refused or could not complete.
    #[error("dial to {peer} failed: {reason}")]
    DialFailed { peer: PeerId, reason: String },
    /// An outbound dial exceeded the configured deadline.
    #[error("dial to {0} timed out")]
    DialTimeout(PeerId),
    /// The signaling session itself has been released.
    #[error("signaling session closed")]
    Closed,
}

/// Failures surfaced by the discovery service.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Identity allocation failed — fatal to that `initialize` call only,
    /// recoverable by retrying. Callers fall back to the simulated path.
    #[error("signaling unavailable")]
    SignalingUnavailable(#[source] SignalingError),
    /// Operation attempted before `initialize` succeeded.
    #[error("discovery service not initialized")]
    NotInitialized,
    /// A specific outbound attempt failed; no broader effect.
    #[error("connect to {peer} failed")]
    ConnectFailed {
        peer: PeerId,
        #[source]
        source: SignalingError,
    },
}
