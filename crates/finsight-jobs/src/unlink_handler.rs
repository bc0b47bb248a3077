//! Job handler that removes remote storage objects after soft deletion.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use finsight_core::JobType;
use finsight_storage::ObjectStore;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Best-effort removal of an orphaned storage object.
///
/// Statement deletion responds immediately; the object itself is unlinked
/// here, asynchronously, with the queue's retry policy absorbing transient
/// storage faults.
pub struct StorageUnlinkHandler {
    store: Arc<dyn ObjectStore>,
}

impl StorageUnlinkHandler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Payload for a `storage_unlink` job.
    pub fn payload(public_id: &str) -> serde_json::Value {
        json!({ "public_id": public_id })
    }
}

#[async_trait]
impl JobHandler for StorageUnlinkHandler {
    fn job_type(&self) -> JobType {
        JobType::StorageUnlink
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(public_id) = ctx
            .payload()
            .and_then(|p| p.get("public_id"))
            .and_then(|v| v.as_str())
            .map(String::from)
        else {
            return JobResult::Failed("unlink job payload has no public_id".into());
        };

        match self.store.remove(&public_id).await {
            Ok(removed) => {
                if !removed {
                    // Already gone; that is the desired end state.
                    debug!(public_id = %public_id, "storage object already absent");
                }
                JobResult::Success(Some(json!({ "public_id": public_id, "removed": removed })))
            }
            Err(e) => {
                warn!(public_id = %public_id, error = %e, "storage unlink failed");
                JobResult::Retry(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::{Job, JobStatus};
    use finsight_storage::MemoryObjectStore;
    use uuid::Uuid;

    fn unlink_job(payload: Option<serde_json::Value>) -> Job {
        Job {
            id: Uuid::now_v7(),
            statement_id: None,
            job_type: JobType::StorageUnlink,
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

    #[tokio::test]
    async fn test_removes_object() {
        let store = Arc::new(MemoryObjectStore::new());
        let obj = store.store(b"%PDF-1.4", "u1", "jan.pdf").await.unwrap();
        let handler = StorageUnlinkHandler::new(store.clone());

        let result = handler
            .execute(JobContext::new(unlink_job(Some(
                StorageUnlinkHandler::payload(&obj.public_id),
            ))))
            .await;

        assert!(matches!(result, JobResult::Success(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_object_still_succeeds() {
        let handler = StorageUnlinkHandler::new(Arc::new(MemoryObjectStore::new()));
        let result = handler
            .execute(JobContext::new(unlink_job(Some(
                StorageUnlinkHandler::payload("statements/gone"),
            ))))
            .await;

        match result {
            JobResult::Success(Some(data)) => assert_eq!(data["removed"], false),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_fault_requests_retry() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_remove(true);
        let handler = StorageUnlinkHandler::new(store);

        let result = handler
            .execute(JobContext::new(unlink_job(Some(
                StorageUnlinkHandler::payload("statements/abc"),
            ))))
            .await;
        assert!(matches!(result, JobResult::Retry(_)));
    }

    #[tokio::test]
    async fn test_missing_payload_fails_permanently() {
        let handler = StorageUnlinkHandler::new(Arc::new(MemoryObjectStore::new()));
        let result = handler.execute(JobContext::new(unlink_job(None))).await;
        assert!(matches!(result, JobResult::Failed(_)));
    }
}
