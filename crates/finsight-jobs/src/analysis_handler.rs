//! Job handler bridging the queue to the analysis orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use finsight_core::defaults::ANALYSIS_TYPE_DEFAULT;
use finsight_core::{Error, JobType};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::orchestrator::AnalysisOrchestrator;

/// Payload carried by `statement_analysis` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJobPayload {
    pub statement_id: Uuid,
    pub user_id: Uuid,
    #[serde(default = "default_analysis_type")]
    pub analysis_type: String,
}

fn default_analysis_type() -> String {
    ANALYSIS_TYPE_DEFAULT.to_string()
}

impl AnalysisJobPayload {
    pub fn new(statement_id: Uuid, user_id: Uuid, analysis_type: &str) -> Self {
        Self {
            statement_id,
            user_id,
            analysis_type: analysis_type.to_string(),
        }
    }
}

/// Executes queued analysis jobs via the orchestrator.
pub struct AnalysisJobHandler {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl AnalysisJobHandler {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for AnalysisJobHandler {
    fn job_type(&self) -> JobType {
        JobType::StatementAnalysis
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: AnalysisJobPayload = match ctx
            .payload()
            .cloned()
            .ok_or_else(|| Error::Job("analysis job has no payload".into()))
            .and_then(|v| serde_json::from_value(v).map_err(Error::from))
        {
            Ok(p) => p,
            Err(e) => return JobResult::Failed(e.to_string()),
        };

        let result = self
            .orchestrator
            .run(
                payload.statement_id,
                payload.user_id,
                &payload.analysis_type,
                &|percent, message| ctx.report_progress(percent, message),
            )
            .await;

        match result {
            Ok(analysis) => JobResult::Success(Some(json!({
                "analysis_id": analysis.id,
                "statement_id": analysis.statement_id,
                "financial_health_score": analysis.financial_health_score,
            }))),
            // Ownership and state errors will not resolve on retry.
            Err(
                e @ (Error::Precondition(_)
                | Error::NotFound(_)
                | Error::StatementNotFound(_)
                | Error::Validation(_)
                | Error::InvalidInput(_)),
            ) => {
                warn!(
                    statement_id = %payload.statement_id,
                    error = %e,
                    "analysis job failed permanently"
                );
                JobResult::Failed(e.to_string())
            }
            // Transport, storage, extraction, and database faults may clear.
            Err(e) => JobResult::Retry(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        fixture_statement, InMemoryAnalysisRepository, InMemoryStatementRepository,
    };
    use finsight_core::{Job, JobStatus, StatementStatus};
    use finsight_extract::{ExtractionReport, MockExtractionBackend};
    use finsight_storage::{MemoryObjectStore, ObjectStore};

    fn job_with_payload(statement_id: Uuid, payload: Option<serde_json::Value>) -> Job {
        Job {
            id: Uuid::now_v7(),
            statement_id: Some(statement_id),
            job_type: JobType::StatementAnalysis,
            status: JobStatus::Running,
            priority: 0,
            payload,
            result: None,
            error_message: None,
            progress_percent: 0,
            progress_message: None,
            retry_count: 0,
            max_retries: 3,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
        }
    }

    async fn handler_for(
        statements: Arc<InMemoryStatementRepository>,
        extractor: Arc<MockExtractionBackend>,
    ) -> AnalysisJobHandler {
        let orch = AnalysisOrchestrator::new(
            statements,
            Arc::new(InMemoryAnalysisRepository::new()),
            Arc::new(MemoryObjectStore::new()),
            extractor,
        );
        AnalysisJobHandler::new(Arc::new(orch))
    }

    #[tokio::test]
    async fn test_missing_payload_is_permanent_failure() {
        let handler = handler_for(
            Arc::new(InMemoryStatementRepository::new()),
            Arc::new(MockExtractionBackend::new()),
        )
        .await;

        let result = handler
            .execute(JobContext::new(job_with_payload(Uuid::new_v4(), None)))
            .await;
        assert!(matches!(result, JobResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_unknown_statement_is_permanent_failure() {
        let handler = handler_for(
            Arc::new(InMemoryStatementRepository::new()),
            Arc::new(MockExtractionBackend::new()),
        )
        .await;

        let statement_id = Uuid::new_v4();
        let payload = serde_json::to_value(AnalysisJobPayload::new(
            statement_id,
            Uuid::new_v4(),
            "comprehensive",
        ))
        .unwrap();
        let result = handler
            .execute(JobContext::new(job_with_payload(statement_id, Some(payload))))
            .await;
        assert!(matches!(result, JobResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_success_reports_analysis_id() {
        let statements = Arc::new(InMemoryStatementRepository::new());
        let analyses = Arc::new(InMemoryAnalysisRepository::new());
        let storage = Arc::new(MemoryObjectStore::new());
        let user_id = Uuid::new_v4();

        let mut statement = fixture_statement(user_id, StatementStatus::Uploaded);
        let stored = storage
            .store(b"%PDF-1.4", &user_id.to_string(), "jan.pdf")
            .await
            .unwrap();
        statement.storage_public_id = Some(stored.public_id);
        let statement_id = statements.seed(statement);

        let orch = AnalysisOrchestrator::new(
            statements,
            analyses,
            storage,
            Arc::new(MockExtractionBackend::with_report(ExtractionReport::default())),
        );
        let handler = AnalysisJobHandler::new(Arc::new(orch));

        let payload = serde_json::to_value(AnalysisJobPayload::new(
            statement_id,
            user_id,
            "comprehensive",
        ))
        .unwrap();
        let result = handler
            .execute(JobContext::new(job_with_payload(statement_id, Some(payload))))
            .await;

        match result {
            JobResult::Success(Some(data)) => {
                assert_eq!(data["statement_id"], statement_id.to_string());
                assert!(data["analysis_id"].is_string());
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_storage_fault_requests_retry() {
        let statements = Arc::new(InMemoryStatementRepository::new());
        let storage = Arc::new(MemoryObjectStore::new());
        storage.fail_fetch(true);
        let user_id = Uuid::new_v4();
        let statement_id =
            statements.seed(fixture_statement(user_id, StatementStatus::Uploaded));

        let orch = AnalysisOrchestrator::new(
            statements,
            Arc::new(InMemoryAnalysisRepository::new()),
            storage,
            Arc::new(MockExtractionBackend::with_report(ExtractionReport::default())),
        );
        let handler = AnalysisJobHandler::new(Arc::new(orch));

        let payload = serde_json::to_value(AnalysisJobPayload::new(
            statement_id,
            user_id,
            "comprehensive",
        ))
        .unwrap();
        let result = handler
            .execute(JobContext::new(job_with_payload(statement_id, Some(payload))))
            .await;
        assert!(matches!(result, JobResult::Retry(_)));
    }
}
