//! Bearer-authenticated HTTP object store backend.
//!
//! Speaks a minimal object API: `PUT/GET/DELETE {base}/objects/{public_id}`.
//! Every non-success response is mapped to `Error::Storage` with the
//! upstream status and body excerpt, so pipeline errors stay diagnosable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use finsight_core::{Error, Result};

use crate::{derive_public_id, ObjectStore, StoredObject};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Remote object store over HTTP.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Storage(format!("http client init: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Construct from `STORAGE_BASE_URL` / `STORAGE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("STORAGE_BASE_URL")
            .map_err(|_| Error::Config("STORAGE_BASE_URL not set".into()))?;
        let api_key = std::env::var("STORAGE_API_KEY")
            .map_err(|_| Error::Config("STORAGE_API_KEY not set".into()))?;
        Self::new(base_url, api_key)
    }

    fn object_url(&self, public_id: &str) -> String {
        format!("{}/objects/{}", self.base_url, public_id)
    }

    /// Startup round-trip check: store, fetch, and remove a probe object.
    /// Catches bad credentials and unreachable endpoints before serving.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let probe = b"finsight-storage-health-check";
        let obj = self
            .store(probe, "health", "probe.pdf")
            .await
            .map_err(|e| format!("store probe: {e}"))?;
        let data = self
            .fetch(&obj.public_id)
            .await
            .map_err(|e| format!("fetch probe: {e}"))?;
        if data != probe {
            return Err("probe read-back mismatch".to_string());
        }
        self.remove(&obj.public_id)
            .await
            .map_err(|e| format!("remove probe: {e}"))?;
        Ok(())
    }

    async fn error_from_response(op: &str, resp: reqwest::Response) -> Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(200).collect();
        Error::Storage(format!("{op} failed with {status}: {excerpt}"))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn store(&self, data: &[u8], owner: &str, name: &str) -> Result<StoredObject> {
        let public_id = derive_public_id(owner, name);
        let url = self.object_url(&public_id);
        debug!(public_id = %public_id, file_size = data.len(), "storage: store");

        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| Error::Storage(format!("store transport: {e}")))?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response("store", resp).await);
        }

        Ok(StoredObject { public_id, url })
    }

    async fn fetch(&self, public_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.object_url(public_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("fetch transport: {e}")))?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response("fetch", resp).await);
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Storage(format!("fetch body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn remove(&self, public_id: &str) -> Result<bool> {
        let resp = self
            .client
            .delete(self.object_url(public_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("remove transport: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                warn!(public_id = %public_id, "storage: remove target missing");
                Ok(false)
            }
            s if s.is_success() => Ok(true),
            _ => Err(Self::error_from_response("remove", resp).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_against(server: &MockServer) -> HttpObjectStore {
        HttpObjectStore::new(server.uri(), "test-key").unwrap()
    }

    #[tokio::test]
    async fn test_store_puts_bytes_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/objects/statements/[0-9a-f]{24}$"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_against(&server).await;
        let obj = store.store(b"%PDF-1.7", "u1", "jan.pdf").await.unwrap();
        assert!(obj.public_id.starts_with("statements/"));
        assert!(obj.url.ends_with(&obj.public_id));
    }

    #[tokio::test]
    async fn test_store_maps_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let store = store_against(&server).await;
        let err = store.store(b"x", "u1", "jan.pdf").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "{msg}");
        assert!(msg.contains("overloaded"), "{msg}");
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/objects/statements/abc$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .mount(&server)
            .await;

        let store = store_against(&server).await;
        let data = store.fetch("statements/abc").await.unwrap();
        assert_eq!(data, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_remove_missing_is_false_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_against(&server).await;
        assert!(!store.remove("statements/gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_success_is_true() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let store = store_against(&server).await;
        assert!(store.remove("statements/abc").await.unwrap());
    }
}
