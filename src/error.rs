//! Error types for the REST API.

use crate::engine::EngineError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;


/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Error code.
    pub code: String,
}

/// API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Engine error.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Engine(engine) => match engine {
                EngineError::MalformedExecution(_) => {
                    (StatusCode::BAD_REQUEST, "MALFORMED_EXECUTION")
                }
                EngineError::UnassignableExecution(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "UNASSIGNABLE_EXECUTION")
                }
                EngineError::UpstreamFetchFailure(_) => {
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_FETCH_FAILED")
                }
                EngineError::ConcurrentSyncRejected(_) => {
                    (StatusCode::CONFLICT, "SYNC_IN_PROGRESS")
                }
            },
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
