//! Synchronous analysis exports.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use finsight_core::AnalysisRepository;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::exports::{render, ExportFormat};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub analysis_id: Uuid,
    pub format: ExportFormat,
}

/// `POST /exports/analysis`
///
/// Renders the analysis in the requested format and returns it as an
/// attachment. All formats are generated in-process; nothing is queued.
pub async fn export_analysis(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let analysis = state
        .db
        .analyses
        .get(req.analysis_id, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("analysis not found"))?;

    let body = render(&analysis, req.format)?;
    info!(
        analysis_id = %req.analysis_id,
        format = ?req.format,
        bytes = body.len(),
        "analysis exported"
    );

    let filename = format!("analysis-{}.{}", analysis.id, req.format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, req.format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}
