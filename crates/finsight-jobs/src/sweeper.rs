//! Stuck-processing sweeper.
//!
//! A worker crash or lost timeout can leave statements in `processing`
//! forever. The sweeper periodically fails any statement that has been
//! processing longer than the configured threshold, so status polling
//! always terminates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};
use uuid::Uuid;

use finsight_core::defaults::{STUCK_PROCESSING_SECS, SWEEP_INTERVAL_SECS};
use finsight_core::{Result, StatementRepository};

/// Periodic reaper for statements stuck in `processing`.
pub struct Sweeper {
    statements: Arc<dyn StatementRepository>,
    stuck_after: Duration,
    sweep_interval: Duration,
}

impl Sweeper {
    pub fn new(statements: Arc<dyn StatementRepository>) -> Self {
        Self {
            statements,
            stuck_after: Duration::from_secs(STUCK_PROCESSING_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
        }
    }

    /// Override how long a statement may stay in `processing`.
    pub fn with_stuck_after(mut self, after: Duration) -> Self {
        self.stuck_after = after;
        self
    }

    /// Override the sweep cadence.
    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every;
        self
    }

    /// Fail everything stuck past the threshold; returns the affected ids.
    pub async fn sweep_once(&self) -> Result<Vec<Uuid>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.stuck_after)
                .unwrap_or_else(|_| chrono::Duration::hours(1));
        let swept = self.statements.fail_stuck_processing(cutoff).await?;
        if !swept.is_empty() {
            info!(affected = swept.len(), "swept stuck statements to failed");
        }
        Ok(swept)
    }

    /// Spawn the periodic sweep loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);
            // The first tick fires immediately; skip it so a fresh boot does
            // not race statements that just started processing.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    error!(error = %e, "stuck-processing sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_statement, InMemoryStatementRepository};
    use finsight_core::defaults::STUCK_PROCESSING_MESSAGE;
    use finsight_core::StatementStatus;

    #[tokio::test]
    async fn test_sweep_fails_only_stale_processing() {
        let statements = Arc::new(InMemoryStatementRepository::new());
        let user_id = Uuid::new_v4();

        let mut stale = fixture_statement(user_id, StatementStatus::Processing);
        stale.processing_started_at = Some(Utc::now() - chrono::Duration::hours(2));
        let stale_id = statements.seed(stale);

        let fresh_id =
            statements.seed(fixture_statement(user_id, StatementStatus::Processing));
        let uploaded_id =
            statements.seed(fixture_statement(user_id, StatementStatus::Uploaded));

        let sweeper = Sweeper::new(statements.clone());
        let swept = sweeper.sweep_once().await.unwrap();
        assert_eq!(swept, vec![stale_id]);

        let row = statements.snapshot(stale_id).unwrap();
        assert_eq!(row.status, StatementStatus::Failed);
        assert_eq!(row.error_message.as_deref(), Some(STUCK_PROCESSING_MESSAGE));

        assert_eq!(
            statements.snapshot(fresh_id).unwrap().status,
            StatementStatus::Processing
        );
        assert_eq!(
            statements.snapshot(uploaded_id).unwrap().status,
            StatementStatus::Uploaded
        );
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let statements = Arc::new(InMemoryStatementRepository::new());
        let mut stale = fixture_statement(Uuid::new_v4(), StatementStatus::Processing);
        stale.processing_started_at = Some(Utc::now() - chrono::Duration::hours(2));
        statements.seed(stale);

        let sweeper = Sweeper::new(statements);
        assert_eq!(sweeper.sweep_once().await.unwrap().len(), 1);
        assert!(sweeper.sweep_once().await.unwrap().is_empty());
    }
}
