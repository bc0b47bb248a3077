//! Analysis pipeline orchestration.
//!
//! Drives one statement through `uploaded → processing → completed|failed`:
//! fetch the document from storage, run extraction, validate, persist the
//! analysis, and finalize the status machine. Every step after entering
//! `processing` reports failures back onto the statement row.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use finsight_core::{
    AnalysisRepository, CreateAnalysis, Error, Result, Statement, StatementMetadata,
    StatementRepository, StatementStatus,
};
use finsight_extract::{ExtractionBackend, ExtractionReport};
use finsight_storage::ObjectStore;

/// Longest error message persisted onto a statement row.
const ERROR_MESSAGE_MAX: usize = 500;

/// Longest auto-derived summary text.
const SUMMARY_TEXT_MAX: usize = 300;

/// Progress reporter: percent in [0, 100] plus an optional milestone label.
pub type ProgressFn<'a> = &'a (dyn Fn(i32, Option<&str>) + Send + Sync);

/// Runs the full analysis pipeline for one statement.
pub struct AnalysisOrchestrator {
    statements: Arc<dyn StatementRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    storage: Arc<dyn ObjectStore>,
    extractor: Arc<dyn ExtractionBackend>,
}

impl AnalysisOrchestrator {
    pub fn new(
        statements: Arc<dyn StatementRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        storage: Arc<dyn ObjectStore>,
        extractor: Arc<dyn ExtractionBackend>,
    ) -> Self {
        Self {
            statements,
            analyses,
            storage,
            extractor,
        }
    }

    /// Run the pipeline. On any failure after the statement enters
    /// `processing`, the row is moved to `failed` with a truncated message
    /// before the error is returned.
    pub async fn run(
        &self,
        statement_id: Uuid,
        user_id: Uuid,
        analysis_type: &str,
        progress: ProgressFn<'_>,
    ) -> Result<finsight_core::Analysis> {
        let statement = self
            .statements
            .get(statement_id, user_id)
            .await?
            .ok_or(Error::StatementNotFound(statement_id))?;

        // Completed and failed statements may be re-analyzed; reset them
        // back to uploaded first.
        if matches!(
            statement.status,
            StatementStatus::Completed | StatementStatus::Failed
        ) && !self.statements.reset_for_reanalysis(statement_id).await?
        {
            return Err(Error::Precondition(format!(
                "statement {statement_id} changed state before re-analysis could start"
            )));
        }

        if !self.statements.begin_processing(statement_id).await? {
            return Err(Error::Precondition(format!(
                "statement {statement_id} is already being processed"
            )));
        }

        let started = Instant::now();
        match self
            .process(&statement, user_id, analysis_type, started, progress)
            .await
        {
            Ok(analysis) => {
                info!(
                    statement_id = %statement_id,
                    analysis_id = %analysis.id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "analysis completed"
                );
                progress(100, Some("Analysis complete"));
                Ok(analysis)
            }
            Err(e) => {
                let message = truncate(&e.to_string(), ERROR_MESSAGE_MAX);
                if !self.statements.fail_processing(statement_id, &message).await? {
                    // Row already left processing (e.g. the stuck sweeper got
                    // there first); nothing further to record.
                    warn!(
                        statement_id = %statement_id,
                        "failure could not be recorded, statement no longer processing"
                    );
                }
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        statement: &Statement,
        user_id: Uuid,
        analysis_type: &str,
        started: Instant,
        progress: ProgressFn<'_>,
    ) -> Result<finsight_core::Analysis> {
        let statement_id = statement.id;

        progress(10, Some("Fetching document"));
        let public_id = statement
            .storage_public_id
            .as_deref()
            .ok_or_else(|| Error::Storage("statement has no stored document".into()))?;
        let pdf = self.storage.fetch(public_id).await?;

        progress(25, Some("Running extraction"));
        let report = self
            .extractor
            .extract(&pdf, &statement.original_filename, analysis_type)
            .await?;

        progress(70, Some("Validating results"));
        self.statements
            .backfill_metadata(statement_id, metadata_from_report(&report))
            .await?;

        // Re-analysis replaces prior records wholesale.
        let deactivated = self.analyses.deactivate_for_statement(statement_id).await?;
        if deactivated > 0 {
            info!(statement_id = %statement_id, affected = deactivated, "replaced prior analyses");
        }

        progress(85, Some("Saving analysis"));
        let analysis = self
            .analyses
            .insert(build_analysis(
                user_id,
                statement_id,
                analysis_type,
                self.extractor.model_version(),
                started.elapsed().as_secs_f64(),
                &report,
            ))
            .await?;

        if !self.statements.complete_processing(statement_id).await? {
            // Lost the completion race (stuck-processing sweep fired while
            // extraction ran). The sweeper already marked the statement
            // failed, so retract the record we just wrote.
            self.analyses.soft_delete(analysis.id, user_id).await?;
            return Err(Error::orchestration(
                "finalize",
                format!("statement {statement_id} left processing before completion"),
            ));
        }

        Ok(analysis)
    }
}

/// Metadata backfill derived from the extraction report.
fn metadata_from_report(report: &ExtractionReport) -> StatementMetadata {
    let info = &report.document_info;
    StatementMetadata {
        bank_name: info.bank_name.clone(),
        account_type: info.account_type.clone(),
        account_number_masked: info.account_number_masked.clone(),
        statement_period_start: info.statement_period_start.as_deref().and_then(parse_date),
        statement_period_end: info.statement_period_end.as_deref().and_then(parse_date),
    }
}

/// Lenient date parsing for model-produced period strings.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

fn build_analysis(
    user_id: Uuid,
    statement_id: Uuid,
    analysis_type: &str,
    model_version: &str,
    processing_time_seconds: f64,
    report: &ExtractionReport,
) -> CreateAnalysis {
    let summary = &report.summary;
    let detailed = report.detailed_analysis.trim();
    CreateAnalysis {
        user_id,
        statement_id,
        analysis_type: analysis_type.to_string(),
        model_version: model_version.to_string(),
        processing_time_seconds,
        total_income: summary.total_income,
        total_expenses: summary.total_expenses,
        net_cash_flow: summary.effective_net_cash_flow(),
        opening_balance: report.document_info.opening_balance,
        closing_balance: report.document_info.closing_balance,
        financial_health_score: summary.clamped_health_score(),
        transaction_categories: report.transaction_categories.clone().into(),
        spending_patterns: report.spending_patterns.clone().into(),
        income_analysis: report.income_analysis.clone(),
        anomalies: report.anomalies.clone().into(),
        insights: report.insights.clone().into(),
        recommendations: report.recommendations.clone().into(),
        risk_assessment: report.risk_assessment.clone(),
        cash_flow_data: report.cash_flow_analysis.clone(),
        document_info: serde_json::to_value(&report.document_info)
            .unwrap_or(serde_json::Value::Null),
        summary_text: if detailed.is_empty() {
            None
        } else {
            Some(truncate(detailed, SUMMARY_TEXT_MAX))
        },
        detailed_analysis: if detailed.is_empty() {
            None
        } else {
            Some(detailed.to_string())
        },
    }
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        fixture_statement, InMemoryAnalysisRepository, InMemoryStatementRepository,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use finsight_core::{
        CreateStatement, ListStatementsRequest, Statement, StatementStats, UpdateStatement,
    };
    use finsight_extract::schema::Summary;
    use finsight_extract::{DocumentInfo, MockExtractionBackend};
    use finsight_storage::MemoryObjectStore;

    fn no_progress() -> impl Fn(i32, Option<&str>) + Send + Sync {
        |_, _| {}
    }

    fn report_with(summary: Summary, info: DocumentInfo) -> ExtractionReport {
        ExtractionReport {
            summary,
            document_info: info,
            detailed_analysis: "Strong month with healthy savings.".into(),
            ..Default::default()
        }
    }

    struct Setup {
        statements: Arc<InMemoryStatementRepository>,
        analyses: Arc<InMemoryAnalysisRepository>,
        storage: Arc<MemoryObjectStore>,
        user_id: Uuid,
        statement_id: Uuid,
    }

    async fn setup(status: StatementStatus) -> Setup {
        let statements = Arc::new(InMemoryStatementRepository::new());
        let analyses = Arc::new(InMemoryAnalysisRepository::new());
        let storage = Arc::new(MemoryObjectStore::new());
        let user_id = Uuid::new_v4();

        let mut statement = fixture_statement(user_id, status);
        let stored = storage
            .store(b"%PDF-1.4 test", &user_id.to_string(), "statement.pdf")
            .await
            .unwrap();
        statement.storage_public_id = Some(stored.public_id);
        statement.storage_url = Some(stored.url);
        let statement_id = statements.seed(statement);

        Setup {
            statements,
            analyses,
            storage,
            user_id,
            statement_id,
        }
    }

    fn orchestrator(s: &Setup, extractor: Arc<dyn ExtractionBackend>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(
            s.statements.clone(),
            s.analyses.clone(),
            s.storage.clone(),
            extractor,
        )
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_persists() {
        let s = setup(StatementStatus::Uploaded).await;
        let extractor = Arc::new(MockExtractionBackend::with_report(report_with(
            Summary {
                total_income: 5000.0,
                total_expenses: 3200.0,
                net_cash_flow: None,
                transaction_count: 42,
                financial_health_score: 72.5,
            },
            DocumentInfo {
                bank_name: Some("First National".into()),
                statement_period_start: Some("2026-01-01".into()),
                statement_period_end: Some("2026-01-31".into()),
                opening_balance: Some(1000.0),
                closing_balance: Some(2800.0),
                ..Default::default()
            },
        )));

        let orch = orchestrator(&s, extractor);
        let progress = no_progress();
        let analysis = orch
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap();

        // Net cash flow is derived when the model omits it.
        assert_eq!(analysis.net_cash_flow, 1800.0);
        assert_eq!(analysis.financial_health_score, 72.5);
        assert_eq!(analysis.opening_balance, Some(1000.0));
        assert!(analysis.summary_text.is_some());

        let row = s.statements.snapshot(s.statement_id).unwrap();
        assert_eq!(row.status, StatementStatus::Completed);
        assert!(row.processing_completed_at.is_some());
        assert_eq!(row.bank_name.as_deref(), Some("First National"));
        assert_eq!(
            row.statement_period_start,
            NaiveDate::from_ymd_opt(2026, 1, 1)
        );
        assert_eq!(row.statement_period_end, NaiveDate::from_ymd_opt(2026, 1, 31));
    }

    #[tokio::test]
    async fn test_requested_analysis_type_reaches_backend_and_record() {
        let s = setup(StatementStatus::Uploaded).await;
        let extractor = Arc::new(MockExtractionBackend::with_report(ExtractionReport::default()));

        let progress = no_progress();
        let analysis = orchestrator(&s, extractor.clone())
            .run(s.statement_id, s.user_id, "tax_review", &progress)
            .await
            .unwrap();

        assert_eq!(extractor.analysis_types(), vec!["tax_review"]);
        assert_eq!(analysis.analysis_type, "tax_review");
    }

    #[tokio::test]
    async fn test_out_of_range_health_score_is_clamped() {
        let s = setup(StatementStatus::Uploaded).await;
        let extractor = Arc::new(MockExtractionBackend::with_report(report_with(
            Summary {
                financial_health_score: 150.0,
                ..Default::default()
            },
            DocumentInfo::default(),
        )));

        let progress = no_progress();
        let analysis = orchestrator(&s, extractor)
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap();
        assert_eq!(analysis.financial_health_score, 100.0);
    }

    #[tokio::test]
    async fn test_extraction_error_fails_statement_without_analysis() {
        let s = setup(StatementStatus::Uploaded).await;
        let extractor = Arc::new(MockExtractionBackend::with_error(Error::Extraction(
            "model returned malformed output".into(),
        )));

        let progress = no_progress();
        let err = orchestrator(&s, extractor)
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));

        let row = s.statements.snapshot(s.statement_id).unwrap();
        assert_eq!(row.status, StatementStatus::Failed);
        assert!(row
            .error_message
            .as_deref()
            .unwrap()
            .contains("malformed output"));
        assert_eq!(s.analyses.active_count_for(s.statement_id), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_statement() {
        let s = setup(StatementStatus::Uploaded).await;
        s.storage.fail_fetch(true);
        let extractor = Arc::new(MockExtractionBackend::with_report(ExtractionReport::default()));

        let progress = no_progress();
        let err = orchestrator(&s, extractor)
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        let row = s.statements.snapshot(s.statement_id).unwrap();
        assert_eq!(row.status, StatementStatus::Failed);
    }

    #[tokio::test]
    async fn test_already_processing_is_rejected() {
        let s = setup(StatementStatus::Processing).await;
        let extractor = Arc::new(MockExtractionBackend::with_report(ExtractionReport::default()));

        let progress = no_progress();
        let err = orchestrator(&s, extractor)
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));

        // Statement untouched.
        let row = s.statements.snapshot(s.statement_id).unwrap();
        assert_eq!(row.status, StatementStatus::Processing);
    }

    #[tokio::test]
    async fn test_reanalysis_replaces_prior_records() {
        let s = setup(StatementStatus::Uploaded).await;
        let extractor = Arc::new(MockExtractionBackend::with_report(report_with(
            Summary::default(),
            DocumentInfo::default(),
        )));
        let orch = orchestrator(&s, extractor);

        let progress = no_progress();
        let first = orch
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap();
        assert_eq!(s.analyses.active_count_for(s.statement_id), 1);

        // Statement is now completed; a second run resets and replaces.
        let second = orch
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(s.analyses.active_count_for(s.statement_id), 1);
        assert_eq!(
            s.analyses
                .latest_for_statement(s.statement_id)
                .await
                .unwrap()
                .unwrap()
                .id,
            second.id
        );
    }

    /// Statement repo that simulates the stuck-processing sweeper firing
    /// between persistence and completion.
    struct SweptStatements {
        inner: Arc<InMemoryStatementRepository>,
    }

    #[async_trait]
    impl StatementRepository for SweptStatements {
        async fn insert(&self, req: CreateStatement) -> finsight_core::Result<Statement> {
            self.inner.insert(req).await
        }
        async fn get(&self, id: Uuid, user_id: Uuid) -> finsight_core::Result<Option<Statement>> {
            self.inner.get(id, user_id).await
        }
        async fn list(
            &self,
            user_id: Uuid,
            req: ListStatementsRequest,
        ) -> finsight_core::Result<(Vec<Statement>, i64)> {
            self.inner.list(user_id, req).await
        }
        async fn update(
            &self,
            id: Uuid,
            user_id: Uuid,
            req: UpdateStatement,
        ) -> finsight_core::Result<Option<Statement>> {
            self.inner.update(id, user_id, req).await
        }
        async fn begin_processing(&self, id: Uuid) -> finsight_core::Result<bool> {
            self.inner.begin_processing(id).await
        }
        async fn complete_processing(&self, id: Uuid) -> finsight_core::Result<bool> {
            // Sweeper wins the race just before completion.
            self.inner.fail_processing(id, "Processing timeout").await?;
            self.inner.complete_processing(id).await
        }
        async fn fail_processing(&self, id: Uuid, message: &str) -> finsight_core::Result<bool> {
            self.inner.fail_processing(id, message).await
        }
        async fn reset_for_reanalysis(&self, id: Uuid) -> finsight_core::Result<bool> {
            self.inner.reset_for_reanalysis(id).await
        }
        async fn soft_delete(
            &self,
            id: Uuid,
            user_id: Uuid,
        ) -> finsight_core::Result<Option<Option<String>>> {
            self.inner.soft_delete(id, user_id).await
        }
        async fn backfill_metadata(
            &self,
            id: Uuid,
            meta: StatementMetadata,
        ) -> finsight_core::Result<()> {
            self.inner.backfill_metadata(id, meta).await
        }
        async fn fail_stuck_processing(
            &self,
            cutoff: DateTime<Utc>,
        ) -> finsight_core::Result<Vec<Uuid>> {
            self.inner.fail_stuck_processing(cutoff).await
        }
        async fn stats(&self, user_id: Uuid) -> finsight_core::Result<StatementStats> {
            self.inner.stats(user_id).await
        }
    }

    #[tokio::test]
    async fn test_lost_completion_race_retracts_analysis() {
        let s = setup(StatementStatus::Uploaded).await;
        let swept = Arc::new(SweptStatements {
            inner: s.statements.clone(),
        });
        let extractor = Arc::new(MockExtractionBackend::with_report(ExtractionReport::default()));
        let orch = AnalysisOrchestrator::new(
            swept,
            s.analyses.clone(),
            s.storage.clone(),
            extractor,
        );

        let progress = no_progress();
        let err = orch
            .run(s.statement_id, s.user_id, "comprehensive", &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Orchestration { .. }));

        // No active analysis survives a lost completion race.
        assert_eq!(s.analyses.active_count_for(s.statement_id), 0);
        let row = s.statements.snapshot(s.statement_id).unwrap();
        assert_eq!(row.status, StatementStatus::Failed);
    }

    #[test]
    fn test_parse_date_formats() {
        let expect = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(parse_date("2026-01-31"), Some(expect));
        assert_eq!(parse_date(" 2026/01/31 "), Some(expect));
        assert_eq!(parse_date("31/01/2026"), Some(expect));
        assert_eq!(parse_date("January 31"), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        let t = truncate("héllo wörld", 6);
        assert!(t.len() <= 6 + '…'.len_utf8());
    }
}
