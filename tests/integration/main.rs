//! Cairn integration test harness.
//!
//! Tests drive real `DiscoveryService` instances against an in-process
//! `MemoryBroker`. Handshake delivery runs on spawned listener tasks, so
//! assertions about propagated state go through [`wait_for`].

use std::sync::Arc;
use std::time::Duration;

use cairn_core::config::DiscoverySettings;

pub use cairn_core::PeerId;
pub use cairn_discovery::{DiscoveryService, MemoryBroker};

mod discovery;
mod failures;
mod sessions;
mod simulated;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A service on the given broker, not yet initialized.
pub fn node(broker: &Arc<MemoryBroker>) -> DiscoveryService {
    DiscoveryService::new(Arc::new(broker.endpoint()), DiscoverySettings::default())
}

/// A service initialized under `name`. Returns the allocated id.
pub async fn online(broker: &Arc<MemoryBroker>, name: &str) -> (DiscoveryService, PeerId) {
    let service = node(broker);
    let id = service.initialize(name, None).await.expect("initialize");
    (service, id)
}

/// Poll until `predicate` holds. False if it never does within ~2 seconds.
pub async fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Give in-flight listener tasks a moment to settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
