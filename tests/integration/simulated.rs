use crate::*;

use std::sync::Arc;

use cairn_core::config::{DiscoverySettings, SimulationSettings};
use cairn_core::DiscoveryError;
use cairn_discovery::{Discovery, DiscoveryService, SimulatedDiscovery};

use crate::failures::FailingSignaling;

fn fast_sim() -> SimulationSettings {
    SimulationSettings {
        peers: 0,
        scan_delay_ms: 0,
    }
}

/// The two-path selection a composition root performs: real discovery when
/// `initialize` succeeds, the seeded simulated neighborhood otherwise.
#[tokio::test]
async fn broker_failure_selects_the_simulated_path() {
    let service = DiscoveryService::new(Arc::new(FailingSignaling), DiscoverySettings::default());

    let discovery: Arc<dyn Discovery> = match service.initialize("Ava", None).await {
        Ok(_) => Arc::new(service),
        Err(DiscoveryError::SignalingUnavailable(_)) => {
            let sim = Arc::new(SimulatedDiscovery::new(&fast_sim()));
            sim.scan().await;
            sim
        }
        Err(other) => panic!("unexpected initialize error: {other:?}"),
    };

    // Offline path: no identity, no QR, but a populated neighborhood.
    assert!(discovery.my_peer_id().is_none());
    assert!(discovery.connection_qr().is_none());
    assert_eq!(discovery.discovered_users().len(), 4);
}

/// Both paths expose the same subscription semantics.
#[tokio::test]
async fn simulated_path_replays_to_late_subscribers() {
    let sim = SimulatedDiscovery::new(&fast_sim());
    sim.scan().await;

    let mut sub = Discovery::subscribe(&sim);
    assert_eq!(sub.drain().len(), 4);

    Discovery::disconnect(&sim);
    assert!(Discovery::discovered_users(&sim).is_empty());
}
