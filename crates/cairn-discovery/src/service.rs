//! The peer discovery service — identity acquisition, connection
//! establishment (inbound and outbound), the discovery handshake, registry
//! mutation, and event fan-out.
//!
//! One listener task per connection owns that connection's lifecycle. The
//! handshake is asymmetric: the initiator sends its profile immediately
//! after the connection opens; the accepting side stores what it receives
//! and does not reply. A peer therefore appears in the roster only once its
//! handshake arrives, not when the connection opens.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use cairn_core::config::DiscoverySettings;
use cairn_core::{
    now_ms, DiscoveryError, DiscoveryMessage, LocalIdentity, PeerId, PeerRecord, QrPayload,
    SignalingError,
};

use crate::events::{DiscoveryEvent, SubscriberSet, Subscription, SubscriptionId};
use crate::policy::{AcceptAll, AcceptPolicy};
use crate::roster::{self, new_roster, Roster};
use crate::session::{new_session_table, SessionHandle, SessionTable};
use crate::signaling::{LinkEvent, LinkEvents, LinkHandle, Signaling};

/// Simulated approximate distance assigned to every received handshake,
/// meters.
const SIMULATED_DISTANCE_M: RangeInclusive<u32> = 10..=209;

/// Common surface of the real and simulated discovery paths.
///
/// The caller picks the path at the composition root: the real
/// [`DiscoveryService`] when `initialize` succeeds, the simulated
/// fallback otherwise.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Own broker-allocated id, `None` before initialize / on the
    /// simulated path.
    fn my_peer_id(&self) -> Option<PeerId>;

    /// Snapshot of every currently discovered peer.
    fn discovered_users(&self) -> Vec<PeerRecord>;

    /// Register for events. Current roster entries are replayed into the
    /// subscription synchronously before it is returned.
    fn subscribe(&self) -> Subscription;

    /// Remove a subscription. Unknown ids are a no-op.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Open a connection to one peer and send the discovery handshake.
    async fn connect_to_peer(&self, target: &PeerId) -> Result<(), DiscoveryError>;

    /// Fire-and-forget scan: connect to every candidate not already
    /// connected.
    fn broadcast_presence(&self, candidates: &[PeerId]);

    /// Connect-by-QR token for the local identity, if ready.
    fn connection_qr(&self) -> Option<String>;

    /// Close everything and return to the uninitialized state. Idempotent.
    fn disconnect(&self);
}

/// The discovery/session core. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct DiscoveryService {
    signaling: Arc<dyn Signaling>,
    settings: DiscoverySettings,
    policy: Arc<dyn AcceptPolicy>,
    shared: Arc<Shared>,
    accept_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// State shared with the accept task and the per-connection listeners.
struct Shared {
    identity: RwLock<Option<LocalIdentity>>,
    sessions: SessionTable,
    roster: Roster,
    subscribers: SubscriberSet,
    /// Set for the duration of a bulk teardown so per-connection close
    /// handling stays silent (bulk teardown emits no per-peer events).
    closing: AtomicBool,
}

impl DiscoveryService {
    pub fn new(signaling: Arc<dyn Signaling>, settings: DiscoverySettings) -> Self {
        Self::with_policy(signaling, settings, Arc::new(AcceptAll))
    }

    pub fn with_policy(
        signaling: Arc<dyn Signaling>,
        settings: DiscoverySettings,
        policy: Arc<dyn AcceptPolicy>,
    ) -> Self {
        Self {
            signaling,
            settings,
            policy,
            shared: Arc::new(Shared {
                identity: RwLock::new(None),
                sessions: new_session_table(),
                roster: new_roster(),
                subscribers: SubscriberSet::new(),
                closing: AtomicBool::new(false),
            }),
            accept_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Acquire an identity from the broker and start accepting inbound
    /// connections.
    ///
    /// Re-initializing while ready is reset-and-replace: existing
    /// registries and the prior identity are torn down first, and a new id
    /// is allocated.
    pub async fn initialize(
        &self,
        display_name: impl Into<String>,
        avatar: Option<String>,
    ) -> Result<PeerId, DiscoveryError> {
        if self.my_peer_id().is_some() {
            tracing::info!("re-initializing: dropping previous identity and sessions");
            self.disconnect();
        }

        let id = self
            .signaling
            .allocate()
            .await
            .map_err(DiscoveryError::SignalingUnavailable)?;

        let identity = LocalIdentity {
            id: id.clone(),
            name: display_name.into(),
            avatar,
        };
        *self.shared.identity.write().expect("identity lock") = Some(identity);

        let signaling = self.signaling.clone();
        let policy = self.policy.clone();
        let shared = self.shared.clone();
        let task = tokio::spawn(accept_loop(signaling, policy, shared));
        *self.accept_task.lock().expect("accept task lock") = Some(task);

        tracing::info!(peer = %id, "discovery service ready");
        Ok(id)
    }

    pub fn my_peer_id(&self) -> Option<PeerId> {
        self.shared
            .identity
            .read()
            .expect("identity lock")
            .as_ref()
            .map(|i| i.id.clone())
    }

    pub fn discovered_users(&self) -> Vec<PeerRecord> {
        roster::snapshot(&self.shared.roster)
    }

    /// Number of open connections. Handshakes may still be outstanding, so
    /// this can exceed `discovered_users().len()`.
    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    pub fn subscribe(&self) -> Subscription {
        let replay: Vec<DiscoveryEvent> = roster::snapshot(&self.shared.roster)
            .into_iter()
            .map(DiscoveryEvent::UserDiscovered)
            .collect();
        self.shared.subscribers.subscribe(replay)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.subscribers.unsubscribe(id);
    }

    /// Open a connection to `target`, send the discovery handshake, and
    /// register the connection.
    ///
    /// Resolves once the handshake has been sent — it does not wait for the
    /// peer's reciprocal handshake.
    pub async fn connect_to_peer(&self, target: &PeerId) -> Result<(), DiscoveryError> {
        let hello = {
            let identity = self.shared.identity.read().expect("identity lock");
            let identity = identity.as_ref().ok_or(DiscoveryError::NotInitialized)?;
            DiscoveryMessage::discovery(identity.as_record())
        };

        // De-duplication: never hold a second handle to the same peer. An
        // existing connection carries the handshake instead; a fresh dial
        // happens only if that handle turns out to be dead.
        {
            let existing_sent = self
                .shared
                .sessions
                .get(target)
                .map(|session| session.link().send(Bytes::from(hello.encode())).is_ok())
                .unwrap_or(false);
            if existing_sent {
                tracing::debug!(peer = %target, "handshake sent on existing connection");
                return Ok(());
            }
        }

        let link = self
            .dial_with_retry(target)
            .await
            .map_err(|source| DiscoveryError::ConnectFailed {
                peer: target.clone(),
                source,
            })?;

        let (handle, events) = link.split();
        handle
            .send(Bytes::from(hello.encode()))
            .map_err(|source| DiscoveryError::ConnectFailed {
                peer: target.clone(),
                source,
            })?;

        self.shared.attach(handle, events, false);
        tracing::info!(peer = %target, "connected, handshake sent");
        Ok(())
    }

    async fn dial_with_retry(&self, target: &PeerId) -> Result<crate::signaling::Link, SignalingError> {
        let attempts = self.settings.connect_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.settings.connect_backoff()).await;
            }
            match tokio::time::timeout(self.settings.connect_timeout(), self.signaling.dial(target))
                .await
            {
                Ok(Ok(link)) => return Ok(link),
                Ok(Err(e)) => {
                    tracing::warn!(peer = %target, attempt, error = %e, "dial failed");
                    last = Some(e);
                }
                Err(_) => {
                    tracing::warn!(peer = %target, attempt, "dial timed out");
                    last = Some(SignalingError::DialTimeout(target.clone()));
                }
            }
        }

        Err(last.expect("at least one dial attempt"))
    }

    /// Connect to every candidate not already in the session registry.
    /// Attempts run concurrently; individual failures are logged, not
    /// surfaced. No-op (with a warning) before initialize.
    pub fn broadcast_presence(&self, candidates: &[PeerId]) {
        let me = match self.my_peer_id() {
            Some(id) => id,
            None => {
                tracing::warn!("presence broadcast before initialize, ignoring");
                return;
            }
        };

        for candidate in candidates {
            if *candidate == me || self.shared.sessions.contains_key(candidate) {
                continue;
            }
            let service = self.clone();
            let target = candidate.clone();
            tokio::spawn(async move {
                if let Err(e) = service.connect_to_peer(&target).await {
                    tracing::warn!(peer = %target, error = %e, "presence broadcast connect failed");
                }
            });
        }
    }

    pub fn connection_qr(&self) -> Option<String> {
        self.my_peer_id()
            .map(|id| QrPayload::new(id, now_ms()).encode())
    }

    /// Close every connection, clear both registries, release the broker
    /// resource, and return to the uninitialized state. Idempotent.
    ///
    /// Bulk teardown is silent: no `UserDisconnected` is emitted for the
    /// individually closed connections.
    pub fn disconnect(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);

        if let Some(task) = self.accept_task.lock().expect("accept task lock").take() {
            task.abort();
        }

        let open = self.shared.sessions.len();
        for entry in self.shared.sessions.iter() {
            entry.value().shutdown();
        }
        self.shared.sessions.clear();
        self.shared.roster.clear();
        *self.shared.identity.write().expect("identity lock") = None;
        self.signaling.release();

        self.shared.closing.store(false, Ordering::SeqCst);
        if open > 0 {
            tracing::info!(connections = open, "disconnected");
        }
    }
}

#[async_trait]
impl Discovery for DiscoveryService {
    fn my_peer_id(&self) -> Option<PeerId> {
        DiscoveryService::my_peer_id(self)
    }

    fn discovered_users(&self) -> Vec<PeerRecord> {
        DiscoveryService::discovered_users(self)
    }

    fn subscribe(&self) -> Subscription {
        DiscoveryService::subscribe(self)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        DiscoveryService::unsubscribe(self, id)
    }

    async fn connect_to_peer(&self, target: &PeerId) -> Result<(), DiscoveryError> {
        DiscoveryService::connect_to_peer(self, target).await
    }

    fn broadcast_presence(&self, candidates: &[PeerId]) {
        DiscoveryService::broadcast_presence(self, candidates)
    }

    fn connection_qr(&self) -> Option<String> {
        DiscoveryService::connection_qr(self)
    }

    fn disconnect(&self) {
        DiscoveryService::disconnect(self)
    }
}

/// Accept inbound connections until the signaling session is released.
async fn accept_loop(
    signaling: Arc<dyn Signaling>,
    policy: Arc<dyn AcceptPolicy>,
    shared: Arc<Shared>,
) {
    while let Some(link) = signaling.accept().await {
        let remote = link.remote().clone();

        if !policy.should_accept(&remote) {
            tracing::info!(peer = %remote, "inbound connection rejected by policy");
            let (handle, _events) = link.split();
            handle.close();
            continue;
        }

        tracing::debug!(peer = %remote, "inbound connection accepted");
        let (handle, events) = link.split();
        shared.attach(handle, events, true);
    }
    tracing::debug!("accept loop ended");
}

impl Shared {
    /// Register a connection and start its listener task.
    ///
    /// A handle already registered for the same peer is superseded: shut
    /// down silently, replaced by the new one. For inbound connections a
    /// `ConnectionReceived` is emitted after registration, before the
    /// listener can deliver any handshake it receives.
    fn attach(self: &Arc<Self>, handle: LinkHandle, events: LinkEvents, inbound: bool) {
        let peer = handle.remote().clone();
        let session = SessionHandle::new(handle);
        let token = session.token();
        let stop = session.stop_signal();

        if let Some(old) = self.sessions.insert(peer.clone(), session) {
            tracing::debug!(peer = %peer, "superseding existing connection");
            old.shutdown();
        }

        if inbound {
            self.subscribers
                .emit(DiscoveryEvent::ConnectionReceived(peer.clone()));
        }

        let shared = self.clone();
        tokio::spawn(shared.run_link(peer, token, events, stop));
    }

    /// Per-connection listener. Owns the connection's lifecycle until it
    /// closes, errors, or is superseded/torn down (the stop signal).
    async fn run_link(
        self: Arc<Self>,
        peer: PeerId,
        token: u64,
        mut events: LinkEvents,
        stop: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                // Superseded or bulk teardown: exit without close handling.
                _ = stop.notified() => return,

                event = events.next() => match event {
                    LinkEvent::Data(payload) => self.handle_payload(&peer, &payload),
                    LinkEvent::Closed => break,
                    LinkEvent::Error(reason) => {
                        tracing::warn!(peer = %peer, reason, "connection error");
                        break;
                    }
                },
            }
        }
        self.connection_closed(&peer, token);
    }

    /// Inbound payload handling. Only a discovery handshake mutates state;
    /// everything else is discarded without closing the connection.
    fn handle_payload(&self, peer: &PeerId, payload: &[u8]) {
        match DiscoveryMessage::decode(payload) {
            Ok(DiscoveryMessage::Discovery { version: _, sender }) => {
                let mut record = sender;
                record.distance =
                    Some(rand::thread_rng().gen_range(SIMULATED_DISTANCE_M));

                tracing::debug!(
                    peer = %record.id,
                    name = %record.name,
                    distance = record.distance.unwrap_or(0),
                    "discovery handshake received"
                );

                self.roster.insert(record.id.clone(), record.clone());
                self.subscribers
                    .emit(DiscoveryEvent::UserDiscovered(record));
            }
            Ok(DiscoveryMessage::Disconnect) => {
                tracing::trace!(peer = %peer, "reserved disconnect payload ignored");
            }
            Err(e) => {
                tracing::trace!(peer = %peer, error = %e, "ignoring malformed payload");
            }
        }
    }

    /// Close handling: drop the session entry and the roster entry as one
    /// step, then notify subscribers once.
    fn connection_closed(&self, peer: &PeerId, token: u64) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }

        // Only the task whose handle is still registered cleans up — a
        // superseded connection's task must not tear down its replacement.
        let removed = self
            .sessions
            .remove_if(peer, |_, session| session.token() == token)
            .is_some();
        if removed {
            self.roster.remove(peer);
            tracing::info!(peer = %peer, "peer disconnected");
            self.subscribers
                .emit(DiscoveryEvent::UserDisconnected(peer.clone()));
        }
    }
}
