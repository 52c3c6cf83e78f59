use crate::*;

use bytes::Bytes;
use cairn_core::{ConnectionMedium, DiscoveryMessage, PeerRecord};
use cairn_discovery::{DiscoveryEvent, Signaling};

/// The end-to-end scenario: initialize, connect, reciprocal handshake,
/// close. Discovery is asymmetric — a peer appears only once its own
/// handshake arrives.
#[tokio::test]
async fn full_discovery_scenario() {
    let broker = MemoryBroker::new();
    let (ava, ava_id) = online(&broker, "Ava").await;
    let (zed, zed_id) = online(&broker, "Zed").await;
    let mut events = ava.subscribe();

    // Ava → Zed: Zed learns about Ava, Ava learns nothing yet.
    ava.connect_to_peer(&zed_id).await.expect("connect");
    assert!(
        wait_for(|| zed.discovered_users().iter().any(|u| u.id == ava_id)).await,
        "Zed should receive Ava's handshake"
    );
    let seen_ava = zed
        .discovered_users()
        .into_iter()
        .find(|u| u.id == ava_id)
        .unwrap();
    assert_eq!(seen_ava.name, "Ava");
    assert_eq!(seen_ava.medium, ConnectionMedium::DirectLink);
    let distance = seen_ava.distance.expect("distance assigned");
    assert!((10..=209).contains(&distance), "distance {distance} out of range");
    assert!(ava.discovered_users().is_empty(), "handshake is one-way");

    // Zed → Ava: the reciprocal handshake.
    zed.connect_to_peer(&ava_id).await.expect("reciprocal connect");
    assert!(
        wait_for(|| ava.discovered_users().iter().any(|u| u.id == zed_id)).await,
        "Ava should receive Zed's handshake"
    );
    let seen_zed = ava
        .discovered_users()
        .into_iter()
        .find(|u| u.id == zed_id)
        .unwrap();
    assert_eq!(seen_zed.name, "Zed");
    assert_eq!(ava.discovered_users().len(), 1);

    // Zed goes away: Ava's registries empty, exactly one disconnect event.
    zed.disconnect();
    assert!(
        wait_for(|| ava.discovered_users().is_empty()).await,
        "Zed's record should be removed on close"
    );
    assert!(wait_for(|| ava.session_count() == 0).await);

    settle().await;
    let disconnects: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, DiscoveryEvent::UserDisconnected(id) if *id == zed_id))
        .collect();
    assert_eq!(disconnects.len(), 1, "exactly one disconnect event");
}

/// A repeated handshake for the same id replaces the record wholesale —
/// fields absent from the newer handshake do not survive from the older one.
#[tokio::test]
async fn repeat_handshake_replaces_record() {
    let broker = MemoryBroker::new();
    let (ava, ava_id) = online(&broker, "Ava").await;

    let endpoint = broker.endpoint();
    let sender_id = endpoint.allocate().await.unwrap();
    let link = endpoint.dial(&ava_id).await.unwrap();
    let (tx, _rx) = link.split();

    let first = DiscoveryMessage::discovery(PeerRecord {
        id: sender_id.clone(),
        name: "First".to_string(),
        avatar: Some("avatar://old".to_string()),
        distance: None,
        last_seen: 1_000,
        medium: ConnectionMedium::DirectLink,
    });
    tx.send(Bytes::from(first.encode())).unwrap();
    assert!(wait_for(|| !ava.discovered_users().is_empty()).await);

    let second = DiscoveryMessage::discovery(PeerRecord {
        id: sender_id.clone(),
        name: "Second".to_string(),
        avatar: None,
        distance: None,
        last_seen: 2_000,
        medium: ConnectionMedium::RelayMesh,
    });
    tx.send(Bytes::from(second.encode())).unwrap();
    assert!(
        wait_for(|| {
            ava.discovered_users()
                .iter()
                .any(|u| u.id == sender_id && u.name == "Second")
        })
        .await
    );

    let users = ava.discovered_users();
    assert_eq!(users.len(), 1, "replacement, not accumulation");
    let record = &users[0];
    assert_eq!(record.name, "Second");
    assert!(record.avatar.is_none(), "old avatar must not be merged in");
    assert_eq!(record.last_seen, 2_000);
    assert_eq!(record.medium, ConnectionMedium::RelayMesh);
}

/// Garbage, unknown kinds, and the reserved disconnect payload are ignored
/// without closing the connection; a valid handshake still lands afterwards.
#[tokio::test]
async fn malformed_payloads_are_nonfatal() {
    let broker = MemoryBroker::new();
    let (ava, ava_id) = online(&broker, "Ava").await;
    let mut events = ava.subscribe();

    let endpoint = broker.endpoint();
    let sender_id = endpoint.allocate().await.unwrap();
    let link = endpoint.dial(&ava_id).await.unwrap();
    let (tx, _rx) = link.split();
    assert!(wait_for(|| ava.session_count() == 1).await);

    tx.send(Bytes::from_static(b"not json at all")).unwrap();
    tx.send(Bytes::from_static(b"{\"kind\":\"telemetry\",\"x\":1}"))
        .unwrap();
    tx.send(Bytes::from_static(b"{\"kind\":\"disconnect\"}")).unwrap();
    settle().await;

    assert!(ava.discovered_users().is_empty());
    assert_eq!(ava.session_count(), 1, "connection must stay open");

    // The connection still works.
    let hello = DiscoveryMessage::discovery(PeerRecord {
        id: sender_id.clone(),
        name: "Late".to_string(),
        avatar: None,
        distance: None,
        last_seen: 3_000,
        medium: ConnectionMedium::DirectLink,
    });
    tx.send(Bytes::from(hello.encode())).unwrap();
    assert!(wait_for(|| !ava.discovered_users().is_empty()).await);

    settle().await;
    assert!(
        !events
            .drain()
            .iter()
            .any(|e| matches!(e, DiscoveryEvent::UserDisconnected(_))),
        "malformed payloads must not tear anything down"
    );
}
