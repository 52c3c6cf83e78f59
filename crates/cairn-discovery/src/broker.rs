//! In-process signaling broker.
//!
//! Routes links between endpoints registered on the same broker instance.
//! This is the transport used by the demo daemon and the integration tests;
//! a deployment against a real broker implements [`Signaling`] the same way.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use tokio::sync::{mpsc, Mutex};

use cairn_core::{PeerId, SignalingError};

use crate::signaling::{Link, Signaling};

/// Shared broker state: one inbound-link queue per registered peer.
pub struct MemoryBroker {
    peers: DashMap<PeerId, mpsc::UnboundedSender<Link>>,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: DashMap::new(),
        })
    }

    /// A fresh endpoint on this broker. Identity is allocated lazily by
    /// [`Signaling::allocate`].
    pub fn endpoint(self: &Arc<Self>) -> MemoryEndpoint {
        let (_, rx) = mpsc::unbounded_channel();
        MemoryEndpoint {
            broker: self.clone(),
            local: RwLock::new(None),
            incoming: Mutex::new(rx),
        }
    }

    /// Currently registered peer ids.
    pub fn registered(&self) -> Vec<PeerId> {
        self.peers.iter().map(|e| e.key().clone()).collect()
    }

    fn allocate_id(&self) -> PeerId {
        // Broker-allocated, opaque to the application. Collisions are
        // ruled out by re-drawing, same as any id-issuing broker.
        loop {
            let mut raw = [0u8; 8];
            rand::thread_rng().fill_bytes(&mut raw);
            let id = PeerId::new(hex::encode(raw));
            if !self.peers.contains_key(&id) {
                return id;
            }
        }
    }
}

/// One peer's handle onto a [`MemoryBroker`].
pub struct MemoryEndpoint {
    broker: Arc<MemoryBroker>,
    local: RwLock<Option<PeerId>>,
    incoming: Mutex<mpsc::UnboundedReceiver<Link>>,
}

impl MemoryEndpoint {
    fn local_id(&self) -> Option<PeerId> {
        self.local.read().expect("local id lock").clone()
    }
}

#[async_trait]
impl Signaling for MemoryEndpoint {
    async fn allocate(&self) -> Result<PeerId, SignalingError> {
        // Re-allocation after release starts a new session under a new id.
        self.release();

        let id = self.broker.allocate_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.broker.peers.insert(id.clone(), tx);
        *self.incoming.lock().await = rx;
        *self.local.write().expect("local id lock") = Some(id.clone());

        tracing::debug!(peer = %id, "identity allocated");
        Ok(id)
    }

    async fn dial(&self, target: &PeerId) -> Result<Link, SignalingError> {
        let local = self.local_id().ok_or(SignalingError::Closed)?;

        let inbound = self
            .broker
            .peers
            .get(target)
            .map(|e| e.value().clone())
            .ok_or_else(|| SignalingError::DialFailed {
                peer: target.clone(),
                reason: "unknown peer".to_string(),
            })?;

        let (ours, theirs) = Link::pair(local, target.clone());
        inbound.send(theirs).map_err(|_| SignalingError::DialFailed {
            peer: target.clone(),
            reason: "peer went away".to_string(),
        })?;

        Ok(ours)
    }

    async fn accept(&self) -> Option<Link> {
        self.incoming.lock().await.recv().await
    }

    fn release(&self) {
        if let Some(id) = self.local.write().expect("local id lock").take() {
            self.broker.peers.remove(&id);
            tracing::debug!(peer = %id, "identity released");
        }
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.release();
    }
}
