//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use finsight_core::Error as CoreError;

/// Error returned by API handlers; renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match &e {
            CoreError::Precondition(_)
            | CoreError::InvalidInput(_)
            | CoreError::InvalidTransition(_)
            | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_)
            | CoreError::StatementNotFound(_)
            | CoreError::AnalysisNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Database(db) if is_unique_violation(db) => StatusCode::CONFLICT,
            CoreError::ExtractionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Storage(_) | CoreError::Extraction(_) | CoreError::Request(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details stay in logs, not in response bodies.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %e, "internal error");
            "internal server error".to_string()
        } else {
            e.to_string()
        };

        Self { status, message }
    }
}

/// Postgres unique-constraint violation (duplicate email, mostly).
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
