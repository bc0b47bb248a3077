//! In-memory repository fakes for exercising the job pipeline without a
//! database. Used by this crate's tests and available to downstream test
//! code.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use finsight_core::defaults::{JOB_MAX_RETRIES, STUCK_PROCESSING_MESSAGE};
use finsight_core::{
    Analysis, AnalysisRepository, AnalysisStats, CreateAnalysis, CreateStatement, Job,
    JobRepository, JobStatus, JobType, ListAnalysesRequest, ListStatementsRequest, QueueStats,
    Result, Statement, StatementMetadata, StatementRepository, StatementStats, StatementStatus,
    UpdateStatement,
};

/// Build a statement row the way an upload would, for seeding fakes.
pub fn fixture_statement(user_id: Uuid, status: StatementStatus) -> Statement {
    let now = Utc::now();
    Statement {
        id: Uuid::now_v7(),
        user_id,
        filename: "a1b2c3_statement.pdf".into(),
        original_filename: "statement.pdf".into(),
        file_size: 1024,
        file_type: "application/pdf".into(),
        storage_public_id: Some("statements/abc123".into()),
        storage_url: Some("https://storage.example.com/objects/statements/abc123".into()),
        status,
        processing_started_at: match status {
            StatementStatus::Processing => Some(now),
            _ => None,
        },
        processing_completed_at: None,
        error_message: None,
        category: Default::default(),
        bank_name: None,
        account_type: None,
        account_number_masked: None,
        statement_period_start: None,
        statement_period_end: None,
        notes: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// STATEMENTS
// =============================================================================

/// In-memory [`StatementRepository`].
#[derive(Default)]
pub struct InMemoryStatementRepository {
    rows: Mutex<HashMap<Uuid, Statement>>,
}

impl InMemoryStatementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-built row; returns its id.
    pub fn seed(&self, statement: Statement) -> Uuid {
        let id = statement.id;
        self.rows.lock().unwrap().insert(id, statement);
        id
    }

    /// Direct snapshot of a row, bypassing ownership and active filters.
    pub fn snapshot(&self, id: Uuid) -> Option<Statement> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl StatementRepository for InMemoryStatementRepository {
    async fn insert(&self, req: CreateStatement) -> Result<Statement> {
        let now = Utc::now();
        let statement = Statement {
            id: Uuid::now_v7(),
            user_id: req.user_id,
            filename: req.filename,
            original_filename: req.original_filename,
            file_size: req.file_size,
            file_type: req.file_type,
            storage_public_id: Some(req.storage_public_id),
            storage_url: Some(req.storage_url),
            status: StatementStatus::Uploaded,
            processing_started_at: None,
            processing_completed_at: None,
            error_message: None,
            category: req.category,
            bank_name: req.bank_name,
            account_type: req.account_type,
            account_number_masked: None,
            statement_period_start: None,
            statement_period_end: None,
            notes: req.notes,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.rows
            .lock()
            .unwrap()
            .insert(statement.id, statement.clone());
        Ok(statement)
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Statement>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .filter(|s| s.is_active && s.user_id == user_id)
            .cloned())
    }

    async fn list(
        &self,
        user_id: Uuid,
        req: ListStatementsRequest,
    ) -> Result<(Vec<Statement>, i64)> {
        let rows = self.rows.lock().unwrap();
        let mut matches: Vec<Statement> = rows
            .values()
            .filter(|s| s.is_active && s.user_id == user_id)
            .filter(|s| req.category.map_or(true, |c| s.category == c))
            .filter(|s| req.status.map_or(true, |st| s.status == st))
            .filter(|s| {
                req.bank_name.as_deref().map_or(true, |b| {
                    s.bank_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&b.to_lowercase()))
                })
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(req.offset.max(0) as usize)
            .take(req.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateStatement,
    ) -> Result<Option<Statement>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(s) = rows
            .get_mut(&id)
            .filter(|s| s.is_active && s.user_id == user_id)
        else {
            return Ok(None);
        };
        if let Some(category) = req.category {
            s.category = category;
        }
        if let Some(bank_name) = req.bank_name {
            s.bank_name = Some(bank_name);
        }
        if let Some(account_type) = req.account_type {
            s.account_type = Some(account_type);
        }
        if let Some(notes) = req.notes {
            s.notes = Some(notes);
        }
        s.updated_at = Utc::now();
        Ok(Some(s.clone()))
    }

    async fn begin_processing(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let Some(s) = rows
            .get_mut(&id)
            .filter(|s| s.is_active && s.status == StatementStatus::Uploaded)
        else {
            return Ok(false);
        };
        s.status = StatementStatus::Processing;
        s.processing_started_at = Some(Utc::now());
        s.error_message = None;
        s.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_processing(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let Some(s) = rows
            .get_mut(&id)
            .filter(|s| s.is_active && s.status == StatementStatus::Processing)
        else {
            return Ok(false);
        };
        s.status = StatementStatus::Completed;
        s.processing_completed_at = Some(Utc::now());
        s.updated_at = Utc::now();
        Ok(true)
    }

    async fn fail_processing(&self, id: Uuid, message: &str) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let Some(s) = rows
            .get_mut(&id)
            .filter(|s| s.is_active && s.status == StatementStatus::Processing)
        else {
            return Ok(false);
        };
        s.status = StatementStatus::Failed;
        s.error_message = Some(message.to_string());
        s.processing_completed_at = Some(Utc::now());
        s.updated_at = Utc::now();
        Ok(true)
    }

    async fn reset_for_reanalysis(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let Some(s) = rows.get_mut(&id).filter(|s| {
            s.is_active
                && matches!(
                    s.status,
                    StatementStatus::Completed | StatementStatus::Failed
                )
        }) else {
            return Ok(false);
        };
        s.status = StatementStatus::Uploaded;
        s.processing_started_at = None;
        s.processing_completed_at = None;
        s.error_message = None;
        s.updated_at = Utc::now();
        Ok(true)
    }

    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<Option<Option<String>>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(s) = rows
            .get_mut(&id)
            .filter(|s| s.is_active && s.user_id == user_id)
        else {
            return Ok(None);
        };
        s.is_active = false;
        s.status = StatementStatus::Deleted;
        s.updated_at = Utc::now();
        Ok(Some(s.storage_public_id.clone()))
    }

    async fn backfill_metadata(&self, id: Uuid, meta: StatementMetadata) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(s) = rows.get_mut(&id) {
            // New non-null values win; None leaves the column untouched.
            s.bank_name = meta.bank_name.or(s.bank_name.take());
            s.account_type = meta.account_type.or(s.account_type.take());
            s.account_number_masked = meta.account_number_masked.or(s.account_number_masked.take());
            s.statement_period_start = meta.statement_period_start.or(s.statement_period_start);
            s.statement_period_end = meta.statement_period_end.or(s.statement_period_end);
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn fail_stuck_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut rows = self.rows.lock().unwrap();
        let mut failed = Vec::new();
        for s in rows.values_mut() {
            if s.is_active
                && s.status == StatementStatus::Processing
                && s.processing_started_at.is_some_and(|t| t < cutoff)
            {
                s.status = StatementStatus::Failed;
                s.error_message = Some(STUCK_PROCESSING_MESSAGE.to_string());
                s.processing_completed_at = Some(Utc::now());
                s.updated_at = Utc::now();
                failed.push(s.id);
            }
        }
        Ok(failed)
    }

    async fn stats(&self, user_id: Uuid) -> Result<StatementStats> {
        let rows = self.rows.lock().unwrap();
        let mine: Vec<&Statement> = rows
            .values()
            .filter(|s| s.is_active && s.user_id == user_id)
            .collect();
        let count = |st: StatementStatus| mine.iter().filter(|s| s.status == st).count() as i64;
        Ok(StatementStats {
            total: mine.len() as i64,
            uploaded: count(StatementStatus::Uploaded),
            processing: count(StatementStatus::Processing),
            completed: count(StatementStatus::Completed),
            failed: count(StatementStatus::Failed),
            total_bytes: mine.iter().map(|s| s.file_size).sum(),
            by_category: serde_json::json!({}),
        })
    }
}

// =============================================================================
// ANALYSES
// =============================================================================

/// In-memory [`AnalysisRepository`].
#[derive(Default)]
pub struct InMemoryAnalysisRepository {
    rows: Mutex<HashMap<Uuid, Analysis>>,
}

impl InMemoryAnalysisRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active analyses for a statement.
    pub fn active_count_for(&self, statement_id: Uuid) -> usize {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.is_active && a.statement_id == statement_id)
            .count()
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryAnalysisRepository {
    async fn insert(&self, req: CreateAnalysis) -> Result<Analysis> {
        let analysis = Analysis {
            id: Uuid::now_v7(),
            user_id: req.user_id,
            statement_id: req.statement_id,
            analysis_type: req.analysis_type,
            model_version: req.model_version,
            processing_time_seconds: req.processing_time_seconds,
            total_income: req.total_income,
            total_expenses: req.total_expenses,
            net_cash_flow: req.net_cash_flow,
            opening_balance: req.opening_balance,
            closing_balance: req.closing_balance,
            financial_health_score: req.financial_health_score,
            transaction_categories: req.transaction_categories,
            spending_patterns: req.spending_patterns,
            income_analysis: req.income_analysis,
            anomalies: req.anomalies,
            insights: req.insights,
            recommendations: req.recommendations,
            risk_assessment: req.risk_assessment,
            cash_flow_data: req.cash_flow_data,
            document_info: req.document_info,
            summary_text: req.summary_text,
            detailed_analysis: req.detailed_analysis,
            is_active: true,
            created_at: Utc::now(),
        };
        self.rows
            .lock()
            .unwrap()
            .insert(analysis.id, analysis.clone());
        Ok(analysis)
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Analysis>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .filter(|a| a.is_active && a.user_id == user_id)
            .cloned())
    }

    async fn latest_for_statement(&self, statement_id: Uuid) -> Result<Option<Analysis>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.is_active && a.statement_id == statement_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn list(
        &self,
        user_id: Uuid,
        req: ListAnalysesRequest,
    ) -> Result<(Vec<Analysis>, i64)> {
        let rows = self.rows.lock().unwrap();
        let mut matches: Vec<Analysis> = rows
            .values()
            .filter(|a| a.is_active && a.user_id == user_id)
            .filter(|a| req.statement_id.map_or(true, |id| a.statement_id == id))
            .filter(|a| {
                req.analysis_type
                    .as_deref()
                    .map_or(true, |t| a.analysis_type == t)
            })
            .filter(|a| {
                req.min_health_score
                    .map_or(true, |min| a.financial_health_score >= min)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(req.offset.max(0) as usize)
            .take(req.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let Some(a) = rows
            .get_mut(&id)
            .filter(|a| a.is_active && a.user_id == user_id)
        else {
            return Ok(false);
        };
        a.is_active = false;
        Ok(true)
    }

    async fn deactivate_for_statement(&self, statement_id: Uuid) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap();
        let mut n = 0;
        for a in rows.values_mut() {
            if a.is_active && a.statement_id == statement_id {
                a.is_active = false;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn stats(&self, user_id: Uuid) -> Result<AnalysisStats> {
        let rows = self.rows.lock().unwrap();
        let mine: Vec<&Analysis> = rows
            .values()
            .filter(|a| a.is_active && a.user_id == user_id)
            .collect();
        let total = mine.len() as i64;
        let avg_health_score = if mine.is_empty() {
            None
        } else {
            Some(mine.iter().map(|a| a.financial_health_score).sum::<f64>() / total as f64)
        };
        Ok(AnalysisStats {
            total,
            avg_health_score,
            total_income: mine.iter().map(|a| a.total_income).sum(),
            total_expenses: mine.iter().map(|a| a.total_expenses).sum(),
            net_cash_flow: mine.iter().map(|a| a.net_cash_flow).sum(),
        })
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// In-memory [`JobRepository`].
#[derive(Default)]
pub struct InMemoryJobRepository {
    rows: Mutex<Vec<Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs queued for a statement, newest first.
    pub fn jobs_for_statement(&self, statement_id: Uuid) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.statement_id == Some(statement_id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn queue(
        &self,
        statement_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job = Job {
            id: Uuid::now_v7(),
            statement_id,
            job_type,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error_message: None,
            progress_percent: 0,
            progress_message: None,
            retry_count: 0,
            max_retries: JOB_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let id = job.id;
        self.rows.lock().unwrap().push(job);
        Ok(id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let mut rows = self.rows.lock().unwrap();
        let next = rows
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| job_types.is_empty() || job_types.contains(&j.job_type))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.created_at.cmp(&a.created_at))
            });
        let Some(job) = next else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == id)
            .cloned())
    }

    async fn update_progress(&self, id: Uuid, percent: i32, message: Option<&str>) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(job) = rows.iter_mut().find(|j| j.id == id) {
            job.progress_percent = percent;
            job.progress_message = message.map(String::from);
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(job) = rows.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Completed;
            job.result = result;
            job.progress_percent = 100;
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(job) = rows.iter_mut().find(|j| j.id == id) {
            if job.retry_count < job.max_retries {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.error_message = Some(error.to_string());
                job.started_at = None;
                job.progress_percent = 0;
                job.progress_message = None;
            } else {
                job.status = JobStatus::Failed;
                job.error_message = Some(error.to_string());
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn fail_permanent(&self, id: Uuid, error: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(job) = rows.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Failed;
            job.error_message = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let rows = self.rows.lock().unwrap();
        let hour_ago = Utc::now() - Duration::hours(1);
        let count = |f: &dyn Fn(&&Job) -> bool| rows.iter().filter(f).count() as i64;
        Ok(QueueStats {
            pending: count(&|j| j.status == JobStatus::Pending),
            running: count(&|j| j.status == JobStatus::Running),
            completed_last_hour: count(&|j| {
                j.status == JobStatus::Completed && j.completed_at.is_some_and(|t| t > hour_ago)
            }),
            failed_last_hour: count(&|j| {
                j.status == JobStatus::Failed && j.completed_at.is_some_and(|t| t > hour_ago)
            }),
            total: rows.len() as i64,
        })
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|j| {
            !matches!(
                j.status,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
            ) || j.completed_at.map_or(true, |t| t >= cutoff)
        });
        Ok((before - rows.len()) as u64)
    }
}
