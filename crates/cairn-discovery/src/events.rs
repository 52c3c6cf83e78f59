//! Typed discovery events and subscriber fan-out.
//!
//! Each subscriber owns an unbounded channel. Delivery is synchronous with
//! the triggering event and unbatched; a dead subscriber (dropped receiver)
//! never blocks the others and is pruned on the next emit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use cairn_core::{PeerId, PeerRecord};

/// Connection lifecycle events delivered to subscribers, in occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A new or replaced presence record.
    UserDiscovered(PeerRecord),
    /// The connection to this peer closed; its record is gone.
    UserDisconnected(PeerId),
    /// An inbound connection was accepted from this peer.
    ConnectionReceived(PeerId),
}

/// Identifies a subscription for `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A live subscription: the id plus the receiving end of the event channel.
/// Dropping the receiver is equivalent to unsubscribing.
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<DiscoveryEvent>,
}

impl Subscription {
    /// Next event, `None` once the source is gone.
    pub async fn next(&mut self) -> Option<DiscoveryEvent> {
        self.events.recv().await
    }

    /// Non-blocking drain of everything already delivered.
    pub fn drain(&mut self) -> Vec<DiscoveryEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }
}

/// The subscriber registry.
pub struct SubscriberSet {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, mpsc::UnboundedSender<DiscoveryEvent>)>>,
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a subscriber. `replay` is delivered into the new channel
    /// before registration completes, under the same lock as any concurrent
    /// emit — a late subscriber sees existing state, then the live stream,
    /// with nothing lost in between.
    pub fn subscribe(&self, replay: impl IntoIterator<Item = DiscoveryEvent>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subs = self.subscribers.lock().expect("subscriber lock");
        for event in replay {
            let _ = tx.send(event);
        }
        subs.push((id, tx));

        Subscription {
            id: SubscriptionId(id),
            events: rx,
        }
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("subscriber lock")
            .retain(|(sub_id, _)| *sub_id != id.0);
    }

    /// Deliver an event to every live subscriber, pruning dead ones.
    pub fn emit(&self, event: DiscoveryEvent) {
        self.subscribers
            .lock()
            .expect("subscriber lock")
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
