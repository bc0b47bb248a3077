//! Statement upload, CRUD, bulk delete, and dashboard stats.

use std::str::FromStr;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use finsight_core::{
    ensure_valid_upload, sanitize_filename, CreateStatement, JobRepository, JobType,
    ListStatementsRequest, Statement, StatementCategory, StatementRepository, StatementStats,
    StatementStatus, UpdateStatement,
};
use finsight_jobs::StorageUnlinkHandler;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::{ListResponse, PageParams};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadFailure {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub uploaded: Vec<Statement>,
    pub failed: Vec<UploadFailure>,
}

#[derive(Debug, Default)]
struct UploadFields {
    category: Option<StatementCategory>,
    bank_name: Option<String>,
    account_type: Option<String>,
    notes: Option<String>,
}

/// `POST /statements/upload`
///
/// Multipart with one or more `files` parts plus optional shared metadata
/// fields. Each file is validated and stored independently; storage must
/// succeed before a database row is written, so a failed upload never
/// leaves a dangling statement.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadOutcome>), ApiError> {
    let mut fields = UploadFields::default();
    let mut files: Vec<(String, String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "file" => {
                let filename = field.file_name().unwrap_or("statement.pdf").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file: {e}")))?;
                files.push((filename, content_type, data.to_vec()));
            }
            "category" => {
                let text = read_text(field).await?;
                fields.category = Some(
                    StatementCategory::from_str(&text).map_err(ApiError::from)?,
                );
            }
            "bank_name" => fields.bank_name = Some(read_text(field).await?),
            "account_type" => fields.account_type = Some(read_text(field).await?),
            "notes" => fields.notes = Some(read_text(field).await?),
            other => {
                warn!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("no files in upload"));
    }

    let mut outcome = UploadOutcome {
        uploaded: Vec::new(),
        failed: Vec::new(),
    };

    for (original_filename, content_type, data) in files {
        match store_one(&state, &user, &fields, &original_filename, &content_type, &data).await {
            Ok(statement) => outcome.uploaded.push(statement),
            Err(e) => outcome.failed.push(UploadFailure {
                filename: original_filename,
                reason: e.message,
            }),
        }
    }

    info!(
        user_id = %user.user_id,
        uploaded = outcome.uploaded.len(),
        failed = outcome.failed.len(),
        "statement upload finished"
    );
    let status = if outcome.uploaded.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed field: {e}")))
}

async fn store_one(
    state: &AppState,
    user: &AuthUser,
    fields: &UploadFields,
    original_filename: &str,
    content_type: &str,
    data: &[u8],
) -> Result<Statement, ApiError> {
    // Size first: oversize is a 413, not a plain precondition failure.
    if data.len() > state.max_file_size {
        return Err(ApiError::payload_too_large("file exceeds maximum size"));
    }
    ensure_valid_upload(original_filename, content_type, data)?;

    let filename = sanitize_filename(original_filename);
    let stored = state
        .storage
        .store(data, &user.user_id.to_string(), &filename)
        .await?;

    let statement = state
        .db
        .statements
        .insert(CreateStatement {
            user_id: user.user_id,
            filename,
            original_filename: original_filename.to_string(),
            file_size: data.len() as i64,
            file_type: content_type.to_string(),
            storage_public_id: stored.public_id,
            storage_url: stored.url,
            category: fields.category.unwrap_or_default(),
            bank_name: fields.bank_name.clone(),
            account_type: fields.account_type.clone(),
            notes: fields.notes.clone(),
        })
        .await?;

    Ok(statement)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListStatementsQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub bank_name: Option<String>,
    pub search: Option<String>,
    pub period_start_from: Option<NaiveDate>,
    pub period_end_to: Option<NaiveDate>,
}

/// `GET /statements`
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListStatementsQuery>,
) -> Result<Json<ListResponse<Statement>>, ApiError> {
    let (limit, offset) = PageParams {
        page: query.page,
        size: query.size,
    }
    .limit_offset();
    let req = ListStatementsRequest {
        category: query
            .category
            .as_deref()
            .map(StatementCategory::from_str)
            .transpose()?,
        status: query
            .status
            .as_deref()
            .map(StatementStatus::from_str)
            .transpose()?,
        bank_name: query.bank_name,
        search: query.search,
        period_start_from: query.period_start_from,
        period_end_to: query.period_end_to,
        limit,
        offset,
    };

    let (statements, total) = state.db.statements.list(user.user_id, req).await?;
    Ok(Json(ListResponse::new(statements, total, limit, offset)))
}

/// `GET /statements/{id}`
pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Statement>, ApiError> {
    state
        .db
        .statements
        .get(id, user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("statement not found"))
}

/// `PUT /statements/{id}`
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatement>,
) -> Result<Json<Statement>, ApiError> {
    state
        .db
        .statements
        .update(id, user.user_id, req)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("statement not found"))
}

/// Soft-delete one statement and queue asynchronous storage cleanup.
/// Returns `Ok(false)` when the statement was not found or already deleted.
async fn delete_one(state: &AppState, user_id: Uuid, id: Uuid) -> Result<bool, ApiError> {
    let Some(public_id) = state.db.statements.soft_delete(id, user_id).await? else {
        return Ok(false);
    };

    if let Some(public_id) = public_id {
        // Cleanup is best-effort: a queue failure must not fail the delete.
        let payload = StorageUnlinkHandler::payload(&public_id);
        if let Err(e) = state
            .db
            .jobs
            .queue(Some(id), JobType::StorageUnlink, 0, Some(payload))
            .await
        {
            warn!(statement_id = %id, error = %e, "failed to queue storage unlink");
        }
    }
    Ok(true)
}

/// `DELETE /statements/{id}`
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !delete_one(&state, user.user_id, id).await? {
        return Err(ApiError::not_found("statement not found"));
    }
    info!(statement_id = %id, "statement deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub statement_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
}

/// `POST /statements/bulk-delete`
///
/// Ids that are missing, already deleted, or owned by someone else are
/// skipped, never errors.
pub async fn bulk_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let mut deleted = Vec::new();
    let mut skipped = Vec::new();
    for id in req.statement_ids {
        if delete_one(&state, user.user_id, id).await? {
            deleted.push(id);
        } else {
            skipped.push(id);
        }
    }
    info!(
        user_id = %user.user_id,
        deleted = deleted.len(),
        skipped = skipped.len(),
        "bulk delete finished"
    );
    Ok(Json(BulkDeleteResponse { deleted, skipped }))
}

/// `GET /statements/stats/summary`
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<StatementStats>, ApiError> {
    Ok(Json(state.db.statements.stats(user.user_id).await?))
}
