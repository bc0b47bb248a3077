//! Health and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value as JsonValue};
use tracing::error;

use crate::error::ApiError;
use crate::AppState;

/// `GET /health`
pub async fn health() -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "service": "finsight-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /health/ready` — fails while the database is unreachable.
pub async fn ready(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    if let Err(e) = state.db.health_check().await {
        error!(error = %e, "readiness check failed");
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "database unavailable",
        ));
    }
    Ok(Json(json!({ "status": "ready" })))
}

/// `GET /health/live`
pub async fn live() -> Json<JsonValue> {
    Json(json!({ "status": "alive" }))
}
