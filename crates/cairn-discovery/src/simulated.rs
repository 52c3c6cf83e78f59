//! Simulated discovery — the fallback path when the signaling broker is
//! unreachable.
//!
//! Presents the same [`Discovery`] surface as the real service, backed by a
//! seeded roster of nearby users behind an artificial scan delay. Nothing
//! here touches the network.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;

use cairn_core::config::SimulationSettings;
use cairn_core::{now_ms, ConnectionMedium, DiscoveryError, PeerId, PeerRecord, SignalingError};

use crate::events::{DiscoveryEvent, SubscriberSet, Subscription, SubscriptionId};
use crate::roster::{self, new_roster, Roster};
use crate::service::Discovery;

/// Delay before a simulated connection-status probe reports.
const STATUS_PROBE_DELAY: Duration = Duration::from_millis(800);

/// Overall link state as shown in a status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    Connecting,
    Disconnected,
}

/// Snapshot returned by a connection-status probe.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub state: LinkState,
    pub medium: ConnectionMedium,
    pub nearby_count: u32,
}

/// The simulated path: a fixed neighborhood, no broker, no identity.
pub struct SimulatedDiscovery {
    roster: Roster,
    subscribers: SubscriberSet,
    scan_delay: Duration,
}

impl SimulatedDiscovery {
    pub fn new(settings: &SimulationSettings) -> Self {
        Self {
            roster: new_roster(),
            subscribers: SubscriberSet::new(),
            scan_delay: Duration::from_millis(settings.scan_delay_ms),
        }
    }

    /// Run one simulated scan: after the artificial delay, the seeded
    /// neighborhood lands in the roster and is announced to subscribers.
    /// Repeat scans refresh the same records.
    pub async fn scan(&self) {
        tokio::time::sleep(self.scan_delay).await;
        for record in seeded_neighbors() {
            self.roster.insert(record.id.clone(), record.clone());
            self.subscribers
                .emit(DiscoveryEvent::UserDiscovered(record));
        }
        tracing::debug!(count = self.roster.len(), "simulated scan complete");
    }

    /// Simulated status probe: random state with a plausible medium and
    /// nearby count.
    pub async fn connection_status(&self) -> ConnectionStatus {
        tokio::time::sleep(STATUS_PROBE_DELAY).await;

        let mut rng = rand::thread_rng();
        let state = match rng.gen_range(0..3) {
            0 => LinkState::Connected,
            1 => LinkState::Connecting,
            _ => LinkState::Disconnected,
        };
        let (medium, nearby_count) = if state == LinkState::Disconnected {
            (ConnectionMedium::None, 0)
        } else {
            let medium = match rng.gen_range(0..3) {
                0 => ConnectionMedium::DirectLink,
                1 => ConnectionMedium::ShortRangeRadio,
                _ => ConnectionMedium::RelayMesh,
            };
            (medium, rng.gen_range(0..10))
        };

        ConnectionStatus {
            state,
            medium,
            nearby_count,
        }
    }
}

#[async_trait]
impl Discovery for SimulatedDiscovery {
    fn my_peer_id(&self) -> Option<PeerId> {
        // No broker identity on the fallback path.
        None
    }

    fn discovered_users(&self) -> Vec<PeerRecord> {
        roster::snapshot(&self.roster)
    }

    fn subscribe(&self) -> Subscription {
        let replay: Vec<DiscoveryEvent> = roster::snapshot(&self.roster)
            .into_iter()
            .map(DiscoveryEvent::UserDiscovered)
            .collect();
        self.subscribers.subscribe(replay)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }

    async fn connect_to_peer(&self, target: &PeerId) -> Result<(), DiscoveryError> {
        if self.roster.contains_key(target) {
            tracing::debug!(peer = %target, "simulated connect");
            Ok(())
        } else {
            Err(DiscoveryError::ConnectFailed {
                peer: target.clone(),
                source: SignalingError::DialFailed {
                    peer: target.clone(),
                    reason: "not nearby".to_string(),
                },
            })
        }
    }

    fn broadcast_presence(&self, candidates: &[PeerId]) {
        tracing::debug!(count = candidates.len(), "simulated presence broadcast ignored");
    }

    fn connection_qr(&self) -> Option<String> {
        // QR connect needs a real peer id.
        None
    }

    fn disconnect(&self) {
        self.roster.clear();
    }
}

/// The seeded neighborhood shown while offline.
fn seeded_neighbors() -> Vec<PeerRecord> {
    let now = now_ms();
    vec![
        PeerRecord {
            id: PeerId::from("sim-1"),
            name: "Alex Kim".to_string(),
            avatar: Some("https://i.pravatar.cc/150?img=1".to_string()),
            distance: Some(15),
            last_seen: now,
            medium: ConnectionMedium::DirectLink,
        },
        PeerRecord {
            id: PeerId::from("sim-2"),
            name: "Jordan Taylor".to_string(),
            avatar: Some("https://i.pravatar.cc/150?img=2".to_string()),
            distance: Some(35),
            last_seen: now.saturating_sub(5 * 60 * 1000),
            medium: ConnectionMedium::ShortRangeRadio,
        },
        PeerRecord {
            id: PeerId::from("sim-3"),
            name: "Sam Rivera".to_string(),
            avatar: Some("https://i.pravatar.cc/150?img=3".to_string()),
            distance: Some(120),
            last_seen: now.saturating_sub(15 * 60 * 1000),
            medium: ConnectionMedium::RelayMesh,
        },
        PeerRecord {
            id: PeerId::from("sim-4"),
            name: "Morgan Chen".to_string(),
            avatar: Some("https://i.pravatar.cc/150?img=4".to_string()),
            distance: Some(200),
            last_seen: now,
            medium: ConnectionMedium::RelayMesh,
        },
    ]
}
