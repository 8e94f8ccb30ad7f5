//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Read-only status views for the presentation layer
//! - Confirmed camera removal
//! - Error responses via `Error`'s `IntoResponse`

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub running: bool,
    pub registry_url: String,
    pub detector_url: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        running: state.orchestrator.is_running().await,
        registry_url: state.config.registry_url.clone(),
        detector_url: state.config.detector_url.clone(),
    })
}
