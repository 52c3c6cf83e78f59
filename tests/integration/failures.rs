use crate::*;

use std::sync::Arc;

use async_trait::async_trait;
use cairn_core::config::DiscoverySettings;
use cairn_core::{DiscoveryError, SignalingError};
use cairn_discovery::{DiscoveryService, Link, Signaling};

/// A broker that is down: allocation and dialing both fail.
pub struct FailingSignaling;

#[async_trait]
impl Signaling for FailingSignaling {
    async fn allocate(&self) -> Result<PeerId, SignalingError> {
        Err(SignalingError::Unavailable("broker offline".to_string()))
    }

    async fn dial(&self, target: &PeerId) -> Result<Link, SignalingError> {
        Err(SignalingError::DialFailed {
            peer: target.clone(),
            reason: "broker offline".to_string(),
        })
    }

    async fn accept(&self) -> Option<Link> {
        None
    }

    fn release(&self) {}
}

/// A broker whose dials never resolve.
struct HangingSignaling;

#[async_trait]
impl Signaling for HangingSignaling {
    async fn allocate(&self) -> Result<PeerId, SignalingError> {
        Ok(PeerId::from("hung-local"))
    }

    async fn dial(&self, _target: &PeerId) -> Result<Link, SignalingError> {
        std::future::pending().await
    }

    async fn accept(&self) -> Option<Link> {
        std::future::pending().await
    }

    fn release(&self) {}
}

/// Allocation failure surfaces as `SignalingUnavailable` and leaves the
/// service not ready.
#[tokio::test]
async fn initialize_failure_is_recoverable() {
    let service = DiscoveryService::new(Arc::new(FailingSignaling), DiscoverySettings::default());

    let err = service.initialize("Ava", None).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::SignalingUnavailable(_)));
    assert!(service.my_peer_id().is_none());

    // Still not ready: operations keep failing locally.
    let err = service.connect_to_peer(&PeerId::from("p2")).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NotInitialized));
}

/// A hung dial is bounded by the configured timeout and retry count.
#[tokio::test(start_paused = true)]
async fn hung_dial_times_out_after_bounded_retries() {
    let settings = DiscoverySettings {
        connect_timeout_ms: 100,
        connect_attempts: 3,
        connect_backoff_ms: 50,
    };
    let service = DiscoveryService::new(Arc::new(HangingSignaling), settings);
    service.initialize("Ava", None).await.expect("initialize");

    let started = tokio::time::Instant::now();
    let err = service
        .connect_to_peer(&PeerId::from("p2"))
        .await
        .unwrap_err();

    match err {
        DiscoveryError::ConnectFailed { peer, source } => {
            assert_eq!(peer, PeerId::from("p2"));
            assert!(matches!(source, SignalingError::DialTimeout(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // 3 × 100ms timeouts + 2 × 50ms backoffs of virtual time.
    assert_eq!(started.elapsed().as_millis(), 400);
    assert_eq!(service.session_count(), 0);
}
