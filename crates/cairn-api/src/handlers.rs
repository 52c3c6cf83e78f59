//! /status, /peers, /connect, /broadcast, /qr handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cairn_core::{DiscoveryError, PeerId, PeerRecord};
use cairn_discovery::Discovery;

/// Shared handle to the running discovery path (real or simulated).
#[derive(Clone)]
pub struct ApiState {
    pub discovery: Arc<dyn Discovery>,
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub peer_id: Option<String>,
    pub ready: bool,
    pub peers_discovered: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let peer_id = state.discovery.my_peer_id();
    Json(StatusResponse {
        ready: peer_id.is_some(),
        peer_id: peer_id.map(|id| id.to_string()),
        peers_discovered: state.discovery.discovered_users().len(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerRecord>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    Json(PeersResponse {
        peers: state.discovery.discovered_users(),
    })
}

// ── /connect ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub peer_id: String,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn handle_connect(
    State(state): State<ApiState>,
    Json(req): Json<ConnectRequest>,
) -> (StatusCode, Json<ConnectResponse>) {
    let target = PeerId::new(req.peer_id);
    match state.discovery.connect_to_peer(&target).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ConnectResponse {
                connected: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(peer = %target, error = %e, "connect via API failed");
            let status = match e {
                DiscoveryError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(ConnectResponse {
                    connected: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

// ── /broadcast ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub peer_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub requested: usize,
}

pub async fn handle_broadcast(
    State(state): State<ApiState>,
    Json(req): Json<BroadcastRequest>,
) -> Json<BroadcastResponse> {
    let candidates: Vec<PeerId> = req.peer_ids.into_iter().map(PeerId::new).collect();
    state.discovery.broadcast_presence(&candidates);
    Json(BroadcastResponse {
        requested: candidates.len(),
    })
}

// ── /qr ──────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct QrResponse {
    pub data: Option<String>,
}

pub async fn handle_qr(State(state): State<ApiState>) -> (StatusCode, Json<QrResponse>) {
    match state.discovery.connection_qr() {
        Some(data) => (StatusCode::OK, Json(QrResponse { data: Some(data) })),
        None => (StatusCode::NOT_FOUND, Json(QrResponse { data: None })),
    }
}
