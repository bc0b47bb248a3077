//! Core traits for finsight abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability. The job pipeline
//! holds repositories as trait objects so orchestration logic can be unit
//! tested against in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// STATEMENT REPOSITORY
// =============================================================================

/// Repository for statement rows and their status machine.
///
/// All status transitions are compare-and-set UPDATEs guarded on the
/// persisted status; the `bool` returns report whether the guard matched.
#[async_trait]
pub trait StatementRepository: Send + Sync {
    /// Insert a new statement in `uploaded` status.
    async fn insert(&self, req: CreateStatement) -> Result<Statement>;

    /// Fetch an active statement owned by `user_id`.
    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Statement>>;

    /// List active statements owned by `user_id` with filters; returns the
    /// page and the total match count.
    async fn list(
        &self,
        user_id: Uuid,
        req: ListStatementsRequest,
    ) -> Result<(Vec<Statement>, i64)>;

    /// Apply user-editable field updates.
    async fn update(&self, id: Uuid, user_id: Uuid, req: UpdateStatement)
        -> Result<Option<Statement>>;

    /// CAS `uploaded → processing`; stamps `processing_started_at` and
    /// clears any previous error message.
    async fn begin_processing(&self, id: Uuid) -> Result<bool>;

    /// CAS `processing → completed`; stamps `processing_completed_at`.
    async fn complete_processing(&self, id: Uuid) -> Result<bool>;

    /// CAS `processing → failed` with a human-readable message.
    async fn fail_processing(&self, id: Uuid, message: &str) -> Result<bool>;

    /// Allow re-analysis: CAS `completed|failed → uploaded`, clearing the
    /// previous run's timestamps and error message.
    async fn reset_for_reanalysis(&self, id: Uuid) -> Result<bool>;

    /// Soft delete; returns the storage public id (if any) so the caller can
    /// enqueue asynchronous unlinking. A second call returns `None`.
    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<Option<Option<String>>>;

    /// Backfill extracted metadata. `None` fields and existing non-null
    /// columns are left untouched; new non-null values win.
    async fn backfill_metadata(&self, id: Uuid, meta: StatementMetadata) -> Result<()>;

    /// Fail every statement stuck in `processing` since before `cutoff`.
    /// Returns the ids that were transitioned.
    async fn fail_stuck_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;

    /// Aggregate counts for the owner's dashboard.
    async fn stats(&self, user_id: Uuid) -> Result<StatementStats>;
}

// =============================================================================
// ANALYSIS REPOSITORY
// =============================================================================

/// Repository for immutable analysis records.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Persist a new analysis record.
    async fn insert(&self, req: CreateAnalysis) -> Result<Analysis>;

    /// Fetch an active analysis owned by `user_id`.
    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Analysis>>;

    /// Most recent active analysis for a statement.
    async fn latest_for_statement(&self, statement_id: Uuid) -> Result<Option<Analysis>>;

    /// List active analyses owned by `user_id`; returns page + total.
    async fn list(&self, user_id: Uuid, req: ListAnalysesRequest)
        -> Result<(Vec<Analysis>, i64)>;

    /// Soft delete one analysis.
    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Soft delete every active analysis for a statement (re-analysis
    /// replaces records wholesale). Returns the number deactivated.
    async fn deactivate_for_statement(&self, statement_id: Uuid) -> Result<i64>;

    /// Aggregate figures for the owner's dashboard.
    async fn stats(&self, user_id: Uuid) -> Result<AnalysisStats>;
}

// =============================================================================
// USER REPOSITORY
// =============================================================================

/// Repository for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user; surfaces the unique-email violation as a
    /// database error for the API layer to map to a conflict.
    async fn insert(&self, req: CreateUser) -> Result<User>;

    async fn get(&self, id: Uuid) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Repository for the background job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Enqueue a job; returns its id.
    async fn queue(
        &self,
        statement_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Claim the next pending job of the given types, if any.
    /// Implementations must be safe under concurrent claimants.
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Update progress (0-100) and an optional human-readable milestone.
    async fn update_progress(&self, id: Uuid, percent: i32, message: Option<&str>) -> Result<()>;

    /// Mark a job completed with an optional result payload.
    async fn complete(&self, id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Record a failure. Requeues as `pending` while `retry_count` is below
    /// `max_retries`, otherwise marks the job `failed`.
    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    /// Mark a job `failed` immediately, regardless of retries remaining.
    async fn fail_permanent(&self, id: Uuid, error: &str) -> Result<()>;

    /// Number of pending jobs.
    async fn pending_count(&self) -> Result<i64>;

    /// Queue statistics summary.
    async fn stats(&self) -> Result<QueueStats>;

    /// Delete completed/failed jobs older than `cutoff`; returns rows removed.
    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
