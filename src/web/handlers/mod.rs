use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::camera::Device;
use crate::error::Result;
use crate::session::CameraList;
use crate::state::AppState;
use crate::stream::StreamSessionInfo;

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cameras: usize,
    pub active_streams: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cameras: state.registry.list().len(),
        active_streams: state.scheduler.active_count(),
    })
}

// ============================================================================
// Cameras & Streams
// ============================================================================

/// Re-enumerate and list cameras, same as the `getcameras` endpoint
pub async fn list_cameras(State(state): State<Arc<AppState>>) -> Json<CameraList> {
    Json(state.dispatcher.service().get_cameras().await)
}

/// One camera from the current device set, without re-enumerating
pub async fn get_camera(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Device>> {
    Ok(Json(state.registry.get(&id)?))
}

/// Latest stream session of every camera that streamed
pub async fn list_streams(State(state): State<Arc<AppState>>) -> Json<Vec<StreamSessionInfo>> {
    let mut sessions: Vec<StreamSessionInfo> = state
        .scheduler
        .sessions()
        .iter()
        .map(|session| session.info())
        .collect();
    sessions.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    Json(sessions)
}
