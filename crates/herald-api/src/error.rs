//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping triage and storage errors to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use herald_core::error::HeraldError;
use herald_triage::TriageError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - the item already reached a terminal state.
    Conflict(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 502 Bad Gateway - the origin network rejected or timed out the action.
    BadGateway(String),
    /// 503 Service Unavailable - the store cannot be reached.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "executor_failure", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<TriageError> for ApiError {
    fn from(err: TriageError) -> Self {
        match err {
            TriageError::Validation(msg) => ApiError::BadRequest(msg),
            TriageError::NotFound(id) => ApiError::NotFound(format!("Item not found: {}", id)),
            err @ TriageError::AlreadyTerminal { .. } => ApiError::Conflict(err.to_string()),
            TriageError::ExecutorFailure(e) => ApiError::BadGateway(e.to_string()),
            TriageError::StoreUnavailable(detail) => {
                tracing::error!(error = %detail, "Store unavailable");
                ApiError::ServiceUnavailable("Item store is unavailable".to_string())
            }
        }
    }
}

impl From<HeraldError> for ApiError {
    fn from(err: HeraldError) -> Self {
        match err {
            HeraldError::Validation(msg) => ApiError::BadRequest(msg),
            HeraldError::Storage(detail) => {
                tracing::error!(error = %detail, "Storage error");
                ApiError::ServiceUnavailable("Item store is unavailable".to_string())
            }
            other => {
                tracing::error!(error = %other, "Internal error");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}
