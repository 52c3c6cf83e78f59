//! cairnd — Cairn demo daemon.
//!
//! Composition root: constructs the signaling broker, a small mesh of
//! in-process demo peers, and the local discovery service, then serves the
//! HTTP API over it. The local node falls back to the simulated discovery
//! path if identity allocation fails.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use cairn_core::config::CairnConfig;
use cairn_discovery::{
    Discovery, DiscoveryEvent, DiscoveryService, MemoryBroker, SimulatedDiscovery, Subscription,
};

/// Display names for the in-process demo peers.
const DEMO_PEER_NAMES: [&str; 6] = [
    "Alex Kim",
    "Jordan Taylor",
    "Sam Rivera",
    "Morgan Chen",
    "Priya Shah",
    "Rowan Ellis",
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CairnConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CairnConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CairnConfig::default()
    });

    tracing::info!(name = %config.identity.display_name, "cairnd starting");

    let broker = MemoryBroker::new();

    // Demo mesh: in-process peers that dial back whoever connects to them,
    // so the local node receives their handshakes and discovers them.
    let mut demo_ids = Vec::new();
    for i in 0..config.simulation.peers {
        let name = DEMO_PEER_NAMES[i as usize % DEMO_PEER_NAMES.len()];
        let peer = DiscoveryService::new(Arc::new(broker.endpoint()), config.discovery.clone());
        match peer.initialize(name, None).await {
            Ok(id) => {
                tracing::info!(peer = %id, name, "demo peer online");
                demo_ids.push(id);
                let sub = peer.subscribe();
                tokio::spawn(run_demo_peer(peer, sub));
            }
            Err(e) => tracing::warn!(name, error = %e, "demo peer failed to start"),
        }
    }

    // The local node. Two-path selection: real discovery when the broker
    // allocates an identity, the simulated neighborhood otherwise.
    let service = DiscoveryService::new(Arc::new(broker.endpoint()), config.discovery.clone());
    let discovery: Arc<dyn Discovery> = match service
        .initialize(
            config.identity.display_name.clone(),
            config.identity.avatar.clone(),
        )
        .await
    {
        Ok(id) => {
            tracing::info!(peer = %id, "local node online");
            Arc::new(service)
        }
        Err(e) => {
            tracing::warn!(error = %e, "signaling unavailable, using simulated discovery");
            let sim = Arc::new(SimulatedDiscovery::new(&config.simulation));
            let scanner = sim.clone();
            tokio::spawn(async move { scanner.scan().await });
            sim
        }
    };

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    // Periodic presence broadcast toward the demo mesh (3-second interval).
    let presence_task = {
        let discovery = discovery.clone();
        let candidates = demo_ids.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3));
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => discovery.broadcast_presence(&candidates),
                }
            }
        })
    };

    // Event log: everything the UI would render.
    let event_task = {
        let mut sub = discovery.subscribe();
        tokio::spawn(async move {
            while let Some(event) = sub.next().await {
                match event {
                    DiscoveryEvent::UserDiscovered(user) => tracing::info!(
                        peer = %user.id,
                        name = %user.name,
                        distance = user.distance.unwrap_or(0),
                        "user discovered"
                    ),
                    DiscoveryEvent::UserDisconnected(id) => {
                        tracing::info!(peer = %id, "user disconnected")
                    }
                    DiscoveryEvent::ConnectionReceived(id) => {
                        tracing::info!(peer = %id, "inbound connection")
                    }
                }
            }
        })
    };

    // Roster snapshot printer.
    let roster_printer = {
        let discovery = discovery.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                let users = discovery.discovered_users();
                tracing::info!(count = users.len(), "roster snapshot");
                for user in users {
                    tracing::info!(peer = %user.id, name = %user.name, "  nearby");
                }
            }
        })
    };

    // HTTP API
    let api_task = {
        let state = cairn_api::ApiState {
            discovery: discovery.clone(),
        };
        let port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = cairn_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = presence_task      => tracing::error!("presence task exited: {:?}", r),
        r = event_task         => tracing::error!("event task exited: {:?}", r),
        r = roster_printer     => tracing::error!("roster printer exited: {:?}", r),
        r = api_task           => tracing::error!("API task exited: {:?}", r),
    }

    discovery.disconnect();
    Ok(())
}

/// A demo mesh peer: whenever someone connects in, connect back so they
/// receive our handshake too (the reciprocal half of the asymmetric
/// handshake — carried over the existing connection).
async fn run_demo_peer(service: DiscoveryService, mut sub: Subscription) {
    while let Some(event) = sub.next().await {
        if let DiscoveryEvent::ConnectionReceived(peer) = event {
            tracing::debug!(peer = %peer, "demo peer answering with its own handshake");
            if let Err(e) = service.connect_to_peer(&peer).await {
                tracing::warn!(peer = %peer, error = %e, "demo peer reply failed");
            }
        }
    }
}
