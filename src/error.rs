//! Error handling for the threat monitor

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
///
/// None of these is fatal to the orchestrator: every failure degrades to
/// skipping one unit of work and retrying on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera registry unreachable or returned non-2xx
    #[error("Camera registry fetch failed: {0}")]
    FetchFailed(String),

    /// Capture resource could not be acquired for a camera
    #[error("Capture failed for camera {camera_id}: {message}")]
    CaptureFailed { camera_id: String, message: String },

    /// Detector transport or server error
    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    /// Registry refused or failed a camera deletion
    #[error("Delete failed for camera {camera_id}: {message}")]
    DeleteFailed { camera_id: String, message: String },

    /// Irreversible action requested without explicit confirmation
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::FetchFailed(_) => "FETCH_FAILED",
            Error::CaptureFailed { .. } => "CAPTURE_FAILED",
            Error::DetectionFailed(_) => "DETECTION_FAILED",
            Error::DeleteFailed { .. } => "DELETE_FAILED",
            Error::ConfirmationRequired(_) => "CONFIRMATION_REQUIRED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::FetchFailed(_) | Error::DetectionFailed(_) | Error::DeleteFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::CaptureFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::ConfirmationRequired(_) => StatusCode::PRECONDITION_REQUIRED,
            Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
