//! Analysis job submission, single and batch.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use finsight_core::{Error, JobRepository, JobType, Result, StatementRepository, StatementStatus};

use crate::analysis_handler::AnalysisJobPayload;

/// One successfully queued analysis job.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedJob {
    pub statement_id: Uuid,
    pub job_id: Uuid,
}

/// One statement that could not be queued, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedStatement {
    pub statement_id: Uuid,
    pub reason: String,
}

/// Outcome of a batch submission.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSubmission {
    pub submitted: Vec<SubmittedJob>,
    pub skipped: Vec<SkippedStatement>,
}

/// Queue an analysis job for one statement.
///
/// Rejects statements the caller does not own and statements already in
/// `processing`; completed and failed statements are accepted (the
/// orchestrator resets them).
pub async fn submit_analysis(
    statements: &dyn StatementRepository,
    jobs: &dyn JobRepository,
    user_id: Uuid,
    statement_id: Uuid,
    analysis_type: &str,
) -> Result<Uuid> {
    let statement = statements
        .get(statement_id, user_id)
        .await?
        .ok_or(Error::StatementNotFound(statement_id))?;

    if statement.status == StatementStatus::Processing {
        return Err(Error::Precondition(format!(
            "statement {statement_id} is already being processed"
        )));
    }

    let payload = serde_json::to_value(AnalysisJobPayload::new(
        statement_id,
        user_id,
        analysis_type,
    ))?;
    let job_id = jobs
        .queue(Some(statement_id), JobType::StatementAnalysis, 0, Some(payload))
        .await?;

    info!(statement_id = %statement_id, job_id = %job_id, "analysis job queued");
    Ok(job_id)
}

/// Queue analysis jobs for many statements, skipping the ineligible ones
/// instead of failing the whole batch.
pub async fn submit_batch(
    statements: &dyn StatementRepository,
    jobs: &dyn JobRepository,
    user_id: Uuid,
    statement_ids: &[Uuid],
    analysis_type: &str,
) -> Result<BatchSubmission> {
    let mut submitted = Vec::new();
    let mut skipped = Vec::new();

    for &statement_id in statement_ids {
        match submit_analysis(statements, jobs, user_id, statement_id, analysis_type).await {
            Ok(job_id) => submitted.push(SubmittedJob {
                statement_id,
                job_id,
            }),
            Err(e) if e.is_client_error() => skipped.push(SkippedStatement {
                statement_id,
                reason: e.to_string(),
            }),
            Err(e) => return Err(e),
        }
    }

    info!(
        affected = submitted.len(),
        skipped = skipped.len(),
        "batch analysis submitted"
    );
    Ok(BatchSubmission { submitted, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_statement, InMemoryJobRepository, InMemoryStatementRepository};
    use finsight_core::JobStatus;

    #[tokio::test]
    async fn test_submit_queues_job_with_payload() {
        let statements = InMemoryStatementRepository::new();
        let jobs = InMemoryJobRepository::new();
        let user_id = Uuid::new_v4();
        let statement_id = statements.seed(fixture_statement(user_id, StatementStatus::Uploaded));

        let job_id = submit_analysis(&statements, &jobs, user_id, statement_id, "comprehensive")
            .await
            .unwrap();

        let job = jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.statement_id, Some(statement_id));
        let payload = job.payload.unwrap();
        assert_eq!(payload["user_id"], user_id.to_string());
        assert_eq!(payload["analysis_type"], "comprehensive");
    }

    #[tokio::test]
    async fn test_submit_rejects_processing_statement() {
        let statements = InMemoryStatementRepository::new();
        let jobs = InMemoryJobRepository::new();
        let user_id = Uuid::new_v4();
        let statement_id =
            statements.seed(fixture_statement(user_id, StatementStatus::Processing));

        let err = submit_analysis(&statements, &jobs, user_id, statement_id, "comprehensive")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert_eq!(jobs.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_submit_accepts_completed_statement() {
        let statements = InMemoryStatementRepository::new();
        let jobs = InMemoryJobRepository::new();
        let user_id = Uuid::new_v4();
        let statement_id = statements.seed(fixture_statement(user_id, StatementStatus::Completed));

        assert!(
            submit_analysis(&statements, &jobs, user_id, statement_id, "comprehensive")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_batch_skips_foreign_and_processing() {
        let statements = InMemoryStatementRepository::new();
        let jobs = InMemoryJobRepository::new();
        let user_id = Uuid::new_v4();

        let mine = statements.seed(fixture_statement(user_id, StatementStatus::Uploaded));
        let busy = statements.seed(fixture_statement(user_id, StatementStatus::Processing));
        let theirs =
            statements.seed(fixture_statement(Uuid::new_v4(), StatementStatus::Uploaded));

        let batch = submit_batch(
            &statements,
            &jobs,
            user_id,
            &[mine, busy, theirs],
            "comprehensive",
        )
        .await
        .unwrap();

        assert_eq!(batch.submitted.len(), 1);
        assert_eq!(batch.submitted[0].statement_id, mine);
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(jobs.pending_count().await.unwrap(), 1);
    }
}
