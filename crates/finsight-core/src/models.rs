//! Domain model types for finsight.
//!
//! Statements, analyses, users, and job-queue types shared by every crate.
//! All timestamps are UTC; all ids are UUIDs (v7 for new rows).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// STATEMENTS
// =============================================================================

/// Lifecycle status of an uploaded statement.
///
/// The happy path is `uploaded → processing → completed`. Any failure after
/// entering `processing` lands in `failed`. `deleted` is a soft-delete state
/// reachable from anywhere and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
    Deleted,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementStatus::Uploaded => "uploaded",
            StatementStatus::Processing => "processing",
            StatementStatus::Completed => "completed",
            StatementStatus::Failed => "failed",
            StatementStatus::Deleted => "deleted",
        }
    }

    /// Whether the status machine permits moving from `self` to `next`.
    ///
    /// `completed`/`failed` may return to `uploaded` (re-analysis reset).
    pub fn can_transition_to(&self, next: StatementStatus) -> bool {
        use StatementStatus::*;
        if next == Deleted {
            return *self != Deleted;
        }
        matches!(
            (*self, next),
            (Uploaded, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Uploaded)
                | (Failed, Uploaded)
        )
    }

    /// Terminal processing outcomes (not counting soft deletion).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatementStatus::Completed | StatementStatus::Failed | StatementStatus::Deleted
        )
    }
}

impl std::str::FromStr for StatementStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploaded" => Ok(StatementStatus::Uploaded),
            "processing" => Ok(StatementStatus::Processing),
            "completed" => Ok(StatementStatus::Completed),
            "failed" => Ok(StatementStatus::Failed),
            "deleted" => Ok(StatementStatus::Deleted),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown statement status: {other}"
            ))),
        }
    }
}

/// User-facing classification of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatementCategory {
    #[default]
    Personal,
    Business,
    Investment,
    CreditCard,
}

impl StatementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementCategory::Personal => "personal",
            StatementCategory::Business => "business",
            StatementCategory::Investment => "investment",
            StatementCategory::CreditCard => "credit_card",
        }
    }
}

impl std::str::FromStr for StatementCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "personal" => Ok(StatementCategory::Personal),
            "business" => Ok(StatementCategory::Business),
            "investment" => Ok(StatementCategory::Investment),
            "credit_card" => Ok(StatementCategory::CreditCard),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown statement category: {other}"
            ))),
        }
    }
}

/// An uploaded bank statement and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Storage-safe name (derived at upload time).
    pub filename: String,
    /// Name the file had on the client.
    pub original_filename: String,
    pub file_size: i64,
    pub file_type: String,
    /// Remote storage key; None only if the row predates storage success.
    pub storage_public_id: Option<String>,
    pub storage_url: Option<String>,
    pub status: StatementStatus,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub category: StatementCategory,
    pub bank_name: Option<String>,
    pub account_type: Option<String>,
    /// Last four digits only, e.g. "****1234".
    pub account_number_masked: Option<String>,
    pub statement_period_start: Option<NaiveDate>,
    pub statement_period_end: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for inserting a new statement row after a successful upload.
#[derive(Debug, Clone)]
pub struct CreateStatement {
    pub user_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub file_type: String,
    pub storage_public_id: String,
    pub storage_url: String,
    pub category: StatementCategory,
    pub bank_name: Option<String>,
    pub account_type: Option<String>,
    pub notes: Option<String>,
}

/// User-editable statement fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStatement {
    pub category: Option<StatementCategory>,
    pub bank_name: Option<String>,
    pub account_type: Option<String>,
    pub notes: Option<String>,
}

/// Metadata extracted from the document, backfilled onto the statement.
/// `None` fields never overwrite existing values.
#[derive(Debug, Clone, Default)]
pub struct StatementMetadata {
    pub bank_name: Option<String>,
    pub account_type: Option<String>,
    pub account_number_masked: Option<String>,
    pub statement_period_start: Option<NaiveDate>,
    pub statement_period_end: Option<NaiveDate>,
}

/// Filters for listing statements.
#[derive(Debug, Clone, Default)]
pub struct ListStatementsRequest {
    pub category: Option<StatementCategory>,
    pub status: Option<StatementStatus>,
    /// Case-insensitive substring match on bank name.
    pub bank_name: Option<String>,
    /// Free-text search across filename, bank name, and notes.
    pub search: Option<String>,
    pub period_start_from: Option<NaiveDate>,
    pub period_end_to: Option<NaiveDate>,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregate counts for the statement dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementStats {
    pub total: i64,
    pub uploaded: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total_bytes: i64,
    pub by_category: JsonValue,
}

// =============================================================================
// ANALYSES
// =============================================================================

/// Persisted result of one successful extraction run.
///
/// Immutable after creation: re-analysis soft-deletes prior records and
/// inserts a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub user_id: Uuid,
    pub statement_id: Uuid,
    pub analysis_type: String,
    pub model_version: String,
    pub processing_time_seconds: f64,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
    /// Always within [0, 100].
    pub financial_health_score: f64,
    pub transaction_categories: JsonValue,
    pub spending_patterns: JsonValue,
    pub income_analysis: JsonValue,
    pub anomalies: JsonValue,
    pub insights: JsonValue,
    pub recommendations: JsonValue,
    pub risk_assessment: JsonValue,
    pub cash_flow_data: JsonValue,
    pub document_info: JsonValue,
    pub summary_text: Option<String>,
    pub detailed_analysis: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Analysis {
    /// Percentage of income retained, rounded to 2 decimals.
    /// 0.0 when income is zero or negative (no division errors, ever).
    pub fn savings_rate(&self) -> f64 {
        derived_rate(self.net_cash_flow, self.total_income)
    }

    /// Expenses as a percentage of income, rounded to 2 decimals.
    /// 0.0 when income is zero or negative.
    pub fn expense_ratio(&self) -> f64 {
        derived_rate(self.total_expenses, self.total_income)
    }
}

fn derived_rate(numerator: f64, income: f64) -> f64 {
    if income <= 0.0 || !income.is_finite() {
        return 0.0;
    }
    (numerator / income * 100.0 * 100.0).round() / 100.0
}

/// Parameters for persisting a new analysis.
#[derive(Debug, Clone)]
pub struct CreateAnalysis {
    pub user_id: Uuid,
    pub statement_id: Uuid,
    pub analysis_type: String,
    pub model_version: String,
    pub processing_time_seconds: f64,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
    pub financial_health_score: f64,
    pub transaction_categories: JsonValue,
    pub spending_patterns: JsonValue,
    pub income_analysis: JsonValue,
    pub anomalies: JsonValue,
    pub insights: JsonValue,
    pub recommendations: JsonValue,
    pub risk_assessment: JsonValue,
    pub cash_flow_data: JsonValue,
    pub document_info: JsonValue,
    pub summary_text: Option<String>,
    pub detailed_analysis: Option<String>,
}

/// Filters for listing analyses.
#[derive(Debug, Clone, Default)]
pub struct ListAnalysesRequest {
    pub statement_id: Option<Uuid>,
    pub analysis_type: Option<String>,
    pub min_health_score: Option<f64>,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregate figures for the analysis dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total: i64,
    pub avg_health_score: Option<f64>,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
}

// =============================================================================
// USERS
// =============================================================================

/// A registered account. `hashed_password` never leaves the db/auth layers.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for registering a user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
}

// =============================================================================
// JOBS
// =============================================================================

/// Type of background job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Run the full analysis pipeline for one statement.
    StatementAnalysis,
    /// Best-effort removal of a remote storage object after soft delete.
    StorageUnlink,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::StatementAnalysis => "statement_analysis",
            JobType::StorageUnlink => "storage_unlink",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "statement_analysis" => Ok(JobType::StatementAnalysis),
            "storage_unlink" => Ok(JobType::StorageUnlink),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown job type: {other}"
            ))),
        }
    }
}

/// Queue status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// A queued unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub statement_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub progress_percent: i32,
    pub progress_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}
