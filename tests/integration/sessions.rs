use crate::*;

use std::sync::Arc;

use cairn_core::config::DiscoverySettings;
use cairn_discovery::{AllowList, DiscoveryEvent, DiscoveryService};

/// Concurrent connects to the same peer end with a single registered handle.
#[tokio::test]
async fn concurrent_connects_keep_one_handle() {
    let broker = MemoryBroker::new();
    let (ava, _) = online(&broker, "Ava").await;
    let (zed, zed_id) = online(&broker, "Zed").await;

    let (first, second) = tokio::join!(
        ava.connect_to_peer(&zed_id),
        ava.connect_to_peer(&zed_id)
    );
    first.expect("first connect");
    second.expect("second connect");

    settle().await;
    assert_eq!(ava.session_count(), 1);
    assert!(wait_for(|| zed.session_count() == 1).await);
}

/// A subscriber registered after discoveries immediately receives the
/// current roster as replayed events, before any new activity.
#[tokio::test]
async fn late_subscriber_sees_existing_roster() {
    let broker = MemoryBroker::new();
    let (ava, ava_id) = online(&broker, "Ava").await;
    let (zed, _) = online(&broker, "Zed").await;
    let (kim, _) = online(&broker, "Kim").await;

    zed.connect_to_peer(&ava_id).await.expect("connect");
    kim.connect_to_peer(&ava_id).await.expect("connect");
    assert!(wait_for(|| ava.discovered_users().len() == 2).await);

    // Replay happens synchronously inside subscribe.
    let mut sub = ava.subscribe();
    let events = sub.drain();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| matches!(e, DiscoveryEvent::UserDiscovered(_))));
}

/// Bulk teardown is silent and clears the read surface; the remote side
/// still observes a normal per-connection close.
#[tokio::test]
async fn disconnect_is_silent_locally_and_visible_remotely() {
    let broker = MemoryBroker::new();
    let (ava, ava_id) = online(&broker, "Ava").await;
    let (zed, zed_id) = online(&broker, "Zed").await;

    ava.connect_to_peer(&zed_id).await.expect("connect");
    zed.connect_to_peer(&ava_id).await.expect("reciprocal");
    assert!(wait_for(|| !ava.discovered_users().is_empty()).await);
    assert!(wait_for(|| !zed.discovered_users().is_empty()).await);

    let mut ava_events = ava.subscribe();
    let mut zed_events = zed.subscribe();
    ava_events.drain();
    zed_events.drain();

    ava.disconnect();
    assert!(ava.my_peer_id().is_none());
    assert!(ava.discovered_users().is_empty());
    assert_eq!(ava.session_count(), 0);

    // Zed sees the close as a normal disconnect.
    assert!(wait_for(|| zed.discovered_users().is_empty()).await);
    settle().await;
    assert!(zed_events
        .drain()
        .iter()
        .any(|e| matches!(e, DiscoveryEvent::UserDisconnected(id) if *id == ava_id)));

    // Ava's own teardown emitted nothing.
    assert!(ava_events.drain().is_empty());
}

/// An inbound connection rejected by the accept policy leaves no trace:
/// no session, no roster entry, no events.
#[tokio::test]
async fn rejected_inbound_leaves_no_state() {
    let broker = MemoryBroker::new();

    let gated = DiscoveryService::with_policy(
        Arc::new(broker.endpoint()),
        DiscoverySettings::default(),
        Arc::new(AllowList::default()),
    );
    let gated_id = gated.initialize("Gated", None).await.expect("initialize");
    let mut events = gated.subscribe();

    let (zed, _) = online(&broker, "Zed").await;
    zed.connect_to_peer(&gated_id).await.expect("dial resolves open");

    // The rejected link closes; Zed drops its session entry again.
    assert!(wait_for(|| zed.session_count() == 0).await);
    assert_eq!(gated.session_count(), 0);
    assert!(gated.discovered_users().is_empty());
    assert!(events.drain().is_empty());
}

/// Unsubscribing stops delivery; unsubscribing twice is a no-op.
#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let broker = MemoryBroker::new();
    let (ava, ava_id) = online(&broker, "Ava").await;
    let (zed, _) = online(&broker, "Zed").await;

    let mut sub = ava.subscribe();
    let id = sub.id;
    ava.unsubscribe(id);
    ava.unsubscribe(id);

    zed.connect_to_peer(&ava_id).await.expect("connect");
    assert!(wait_for(|| !ava.discovered_users().is_empty()).await);

    assert!(sub.drain().is_empty());
}
