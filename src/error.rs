use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open camera [{device}]: {reason}")]
    DeviceOpenFailed { device: String, reason: String },

    #[error("Camera is not running: {0}")]
    DeviceNotRunning(String),

    #[error("A stream is already active for camera {0}")]
    StreamAlreadyActive(String),

    #[error("No stream found for camera {0}")]
    StreamNotFound(String),

    #[error("No frame available for camera {0}")]
    FrameUnavailable(String),

    #[error("Capture failure [{device}]: {reason}")]
    CaptureFailure { device: String, reason: String },

    #[error("Consumer disconnected")]
    ConsumerDisconnected,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Whether the error only means the receiving side went away.
    ///
    /// Streaming loops end silently on this instead of reporting it.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, AppError::ConsumerDisconnected)
    }

    fn status_code(&self) -> StatusCode {
        // Always return 200 OK - success/failure is indicated by the success field
        StatusCode::OK
    }
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
