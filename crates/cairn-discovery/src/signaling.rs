//! Signaling abstraction — the opaque-transport boundary.
//!
//! The broker allocates a unique peer identifier and establishes direct
//! logical connections to other identifiers. Cairn has no opinion about the
//! underlying transport: an implementation adapts its native I/O (sockets,
//! data channels, whatever) into a [`Link`]'s event channels.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use cairn_core::{PeerId, SignalingError};

/// Per-connection lifecycle events, in arrival order.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// An inbound payload.
    Data(Bytes),
    /// The peer closed the connection gracefully.
    Closed,
    /// A transport-level failure. Treated like a close once the link is open.
    Error(String),
}

/// An established logical connection to one peer.
///
/// Split into a send half (kept in the session registry) and an event half
/// (consumed by the per-connection listener task).
#[derive(Debug)]
pub struct Link {
    remote: PeerId,
    tx: mpsc::UnboundedSender<LinkEvent>,
    rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    /// Build both ends of a connection between `a` and `b`.
    pub fn pair(a: PeerId, b: PeerId) -> (Link, Link) {
        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();
        (
            Link {
                remote: b,
                tx: tx_ab,
                rx: rx_ba,
            },
            Link {
                remote: a,
                tx: tx_ba,
                rx: rx_ab,
            },
        )
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn split(self) -> (LinkHandle, LinkEvents) {
        (
            LinkHandle {
                remote: self.remote,
                tx: self.tx,
            },
            LinkEvents { rx: self.rx },
        )
    }
}

/// Send half of a link. Dropping it closes the connection from the peer's
/// point of view.
#[derive(Clone)]
pub struct LinkHandle {
    remote: PeerId,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl LinkHandle {
    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn send(&self, payload: Bytes) -> Result<(), SignalingError> {
        self.tx
            .send(LinkEvent::Data(payload))
            .map_err(|_| SignalingError::Closed)
    }

    /// Graceful close. The peer observes [`LinkEvent::Closed`].
    pub fn close(&self) {
        let _ = self.tx.send(LinkEvent::Closed);
    }
}

/// Event half of a link.
pub struct LinkEvents {
    rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl LinkEvents {
    /// Next lifecycle event. A disappearing peer collapses to `Closed`.
    pub async fn next(&mut self) -> LinkEvent {
        self.rx.recv().await.unwrap_or(LinkEvent::Closed)
    }
}

/// The signaling broker capability consumed by the discovery service.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Allocate a fresh identity. One per session; calling again after
    /// `release` starts a new session under a new id.
    async fn allocate(&self) -> Result<PeerId, SignalingError>;

    /// Open a logical connection to `target`. Resolves once the connection
    /// is open.
    async fn dial(&self, target: &PeerId) -> Result<Link, SignalingError>;

    /// Next inbound connection. `None` once the session has been released.
    async fn accept(&self) -> Option<Link>;

    /// Release the broker resource. Idempotent.
    fn release(&self);
}
