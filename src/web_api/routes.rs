//! API Routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::camera_registry::CameraDescriptor;
use crate::log_aggregator::LogEntry;
use crate::state::AppState;
use crate::stream_manager::LiveStreamInfo;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(super::health_check))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:id", delete(delete_camera))
        // Logs
        .route("/api/logs", get(list_logs))
        // Scheduler
        .route("/api/scheduler", get(scheduler_status))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

#[derive(Debug, Serialize)]
struct CameraListResponse {
    cameras: Vec<CameraDescriptor>,
    loading: bool,
    error: Option<String>,
    last_refreshed_at: Option<DateTime<Utc>>,
    live_streams: Vec<LiveStreamInfo>,
}

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.orchestrator.snapshot().await;
    let status = state.orchestrator.registry_status().await;

    Json(CameraListResponse {
        cameras: snapshot.cameras().to_vec(),
        loading: status.loading,
        error: status.last_error,
        last_refreshed_at: status.last_refreshed_at,
        live_streams: state.orchestrator.live_streams().await,
    })
}

/// Any `confirm` value other than `true` is unconfirmed
#[derive(Debug, Deserialize)]
struct DeleteQuery {
    confirm: Option<String>,
}

impl DeleteQuery {
    fn confirmed(&self) -> bool {
        self.confirm.as_deref() == Some("true")
    }
}

async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, crate::Error> {
    state
        .orchestrator
        .remove_camera(&id, query.confirmed())
        .await?;

    Ok(Json(json!({"ok": true, "camera_id": id})))
}

// ========================================
// Log Handlers
// ========================================

#[derive(Debug, Serialize)]
struct LogsResponse {
    safe: Vec<LogEntry>,
    threat: Vec<LogEntry>,
}

async fn list_logs(State(state): State<AppState>) -> impl IntoResponse {
    Json(LogsResponse {
        safe: state.orchestrator.safe_logs().await,
        threat: state.orchestrator.threat_logs().await,
    })
}

async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.loop_states().await)
}
