//! Job handler abstraction.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use finsight_core::{Job, JobType};

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }

    /// Get the statement ID for this job, if any.
    pub fn statement_id(&self) -> Option<Uuid> {
        self.job.statement_id
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed permanently; retrying would produce the same outcome.
    Failed(String),
    /// Job hit a transient failure and should be retried.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(50, Some("Processing..."));
        ctx.report_progress(100, Some("Done"));
        JobResult::Success(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::JobStatus;

    fn job(job_type: JobType, payload: Option<JsonValue>) -> Job {
        Job {
            id: Uuid::new_v4(),
            statement_id: Some(Uuid::new_v4()),
            job_type,
            status: JobStatus::Pending,
            priority: 0,
            payload,
            result: None,
            error_message: None,
            progress_percent: 0,
            progress_message: None,
            retry_count: 0,
            max_retries: 3,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_job_context_statement_id() {
        let j = job(JobType::StatementAnalysis, None);
        let ctx = JobContext::new(j.clone());
        assert_eq!(ctx.statement_id(), j.statement_id);
    }

    #[test]
    fn test_job_context_payload() {
        use serde_json::json;
        let ctx = JobContext::new(job(
            JobType::StorageUnlink,
            Some(json!({"public_id": "statements/abc"})),
        ));
        assert_eq!(ctx.payload().unwrap()["public_id"], "statements/abc");
    }

    #[test]
    fn test_report_progress_without_callback_is_noop() {
        let ctx = JobContext::new(job(JobType::StatementAnalysis, None));
        ctx.report_progress(50, Some("halfway"));
    }

    #[test]
    fn test_progress_callback_receives_milestones() {
        use std::sync::{Arc, Mutex};

        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let ctx = JobContext::new(job(JobType::StatementAnalysis, None))
            .with_progress_callback(move |percent, message| {
                log_clone
                    .lock()
                    .unwrap()
                    .push((percent, message.map(String::from)));
            });

        ctx.report_progress(10, Some("Fetching document"));
        ctx.report_progress(100, None);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (10, Some("Fetching document".to_string())));
        assert_eq!(log[1], (100, None));
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(JobType::StatementAnalysis);
        assert!(handler.can_handle(JobType::StatementAnalysis));
        assert!(!handler.can_handle(JobType::StorageUnlink));

        let result = handler
            .execute(JobContext::new(job(JobType::StatementAnalysis, None)))
            .await;
        assert!(matches!(result, JobResult::Success(None)));
    }
}
