//! Error types for the screening service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::JobStatus;

/// Result type alias for screening operations
pub type Result<T> = std::result::Result<T, Error>;

/// Screening service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload carried no bytes
    #[error("Empty payload: the uploaded file contains no data")]
    EmptyPayload,

    /// Upload exceeds the configured limit
    #[error("Payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Malformed request (multipart field missing or unreadable)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown, malformed or expired job id
    #[error("Job not found or expired: {0}")]
    JobNotFound(String),

    /// Attempted state change that the job lifecycle forbids
    #[error("Invalid transition for job in state {from}: {attempted}")]
    InvalidTransition {
        from: JobStatus,
        attempted: &'static str,
    },

    /// Audio normalization failed
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Engine construction failed
    #[error("engine unavailable: {0}")]
    EngineLoad(String),

    /// Gave up waiting for a concurrent engine construction
    #[error("engine unavailable: load did not finish within {0}s")]
    EngineLoadTimeout(u64),

    /// Transcription call failed
    #[error("transcription error: {0}")]
    Engine(String),

    /// Processing deadline elapsed
    #[error("processing timeout exceeded")]
    TimeoutExceeded,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a conversion error
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Create an engine load error
    pub fn engine_load(message: impl Into<String>) -> Self {
        Self::EngineLoad(message.into())
    }

    /// Create a transcription error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Create a not-found error for a job id as the client spelled it
    pub fn job_not_found(job_id: impl ToString) -> Self {
        Self::JobNotFound(job_id.to_string())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error rejects a submission before any job exists
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::EmptyPayload | Error::PayloadTooLarge { .. } | Error::BadRequest(_)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::EmptyPayload => (StatusCode::BAD_REQUEST, "empty_payload"),
            Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::JobNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            Error::Conversion(_) => (StatusCode::UNPROCESSABLE_ENTITY, "conversion_error"),
            Error::EngineLoad(_) | Error::EngineLoadTimeout(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "engine_unavailable")
            }
            Error::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transcription_error"),
            Error::TimeoutExceeded => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
