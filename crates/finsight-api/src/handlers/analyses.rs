//! Analysis submission, task polling, retrieval, and stats.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use finsight_core::defaults::ANALYSIS_TYPE_DEFAULT;
use finsight_core::{
    Analysis, AnalysisRepository, AnalysisStats, Error, Job, JobRepository, JobStatus,
    ListAnalysesRequest,
};
use finsight_jobs::{submit_analysis, submit_batch, AnalysisJobPayload, BatchSubmission};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::{ListResponse, PageParams};
use crate::AppState;

/// Analysis plus the rates derived from it.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub savings_rate: f64,
    pub expense_ratio: f64,
}

impl From<Analysis> for AnalysisResponse {
    fn from(analysis: Analysis) -> Self {
        let savings_rate = analysis.savings_rate();
        let expense_ratio = analysis.expense_ratio();
        Self {
            analysis,
            savings_rate,
            expense_ratio,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub analysis_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub task_id: Uuid,
    pub statement_id: Uuid,
    pub status: &'static str,
}

/// `POST /analyses/{statement_id}/analyze`
///
/// Accepted statements get a queued job; a statement already in
/// `processing` is a 409 so clients can poll instead of re-submitting.
pub async fn analyze(
    State(state): State<AppState>,
    user: AuthUser,
    Path(statement_id): Path<Uuid>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    let analysis_type = body
        .and_then(|Json(b)| b.analysis_type)
        .unwrap_or_else(|| ANALYSIS_TYPE_DEFAULT.to_string());

    let task_id = submit_analysis(
        state.db.statements.as_ref(),
        state.db.jobs.as_ref(),
        user.user_id,
        statement_id,
        &analysis_type,
    )
    .await
    .map_err(|e| match e {
        Error::Precondition(msg) => ApiError::conflict(msg),
        other => ApiError::from(other),
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            task_id,
            statement_id,
            status: "queued",
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub statement_id: Option<Uuid>,
    pub status: JobStatus,
    pub progress_percent: i32,
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Jobs carry their submitter in the payload; anyone else gets a 404,
/// indistinguishable from a job that never existed.
fn job_belongs_to(job: &Job, user_id: Uuid) -> bool {
    job.payload
        .as_ref()
        .and_then(|p| serde_json::from_value::<AnalysisJobPayload>(p.clone()).ok())
        .map(|p| p.user_id == user_id)
        .unwrap_or(false)
}

/// `GET /analyses/task/{task_id}/status`
pub async fn task_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let job = state
        .db
        .jobs
        .get(task_id)
        .await?
        .filter(|job| job_belongs_to(job, user.user_id))
        .ok_or_else(|| ApiError::not_found("task not found"))?;

    Ok(Json(TaskStatusResponse {
        task_id: job.id,
        statement_id: job.statement_id,
        status: job.status,
        progress_percent: job.progress_percent,
        progress_message: job.progress_message,
        result: job.result,
        error: job.error_message,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListAnalysesQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub statement_id: Option<Uuid>,
    pub analysis_type: Option<String>,
    pub min_health_score: Option<f64>,
}

/// `GET /analyses`
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListAnalysesQuery>,
) -> Result<Json<ListResponse<AnalysisResponse>>, ApiError> {
    let (limit, offset) = PageParams {
        page: query.page,
        size: query.size,
    }
    .limit_offset();
    let req = ListAnalysesRequest {
        statement_id: query.statement_id,
        analysis_type: query.analysis_type,
        min_health_score: query.min_health_score,
        limit,
        offset,
    };

    let (analyses, total) = state.db.analyses.list(user.user_id, req).await?;
    let data = analyses.into_iter().map(AnalysisResponse::from).collect();
    Ok(Json(ListResponse::new(data, total, limit, offset)))
}

/// `GET /analyses/{id}`
pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    state
        .db
        .analyses
        .get(id, user.user_id)
        .await?
        .map(|a| Json(a.into()))
        .ok_or_else(|| ApiError::not_found("analysis not found"))
}

/// `DELETE /analyses/{id}`
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.db.analyses.soft_delete(id, user.user_id).await? {
        return Err(ApiError::not_found("analysis not found"));
    }
    info!(analysis_id = %id, "analysis deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /analyses/stats/summary`
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AnalysisStats>, ApiError> {
    Ok(Json(state.db.analyses.stats(user.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BatchAnalyzeRequest {
    pub statement_ids: Vec<Uuid>,
    pub analysis_type: Option<String>,
}

/// `POST /analyses/batch-analyze`
pub async fn batch_analyze(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BatchAnalyzeRequest>,
) -> Result<(StatusCode, Json<BatchSubmission>), ApiError> {
    let analysis_type = req
        .analysis_type
        .unwrap_or_else(|| ANALYSIS_TYPE_DEFAULT.to_string());
    let submission = submit_batch(
        state.db.statements.as_ref(),
        state.db.jobs.as_ref(),
        user.user_id,
        &req.statement_ids,
        &analysis_type,
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}
