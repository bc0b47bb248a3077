//! Gemini extraction backend.
//!
//! Pipeline per document: resumable upload → poll until the remote file is
//! ACTIVE (bounded budget) → `generateContent` with a JSON response MIME →
//! parse/normalize → best-effort remote file deletion. The uploaded PDF
//! lives on the provider only for the duration of one extraction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use finsight_core::defaults::{
    EXTRACT_POLL_BUDGET, EXTRACT_POLL_INTERVAL_SECS, GEMINI_MODEL,
};
use finsight_core::{Error, Result};

use crate::normalize::parse_report;
use crate::prompt::analysis_prompt;
use crate::schema::ExtractionReport;
use crate::ExtractionBackend;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";
const PDF_MIME: &str = "application/pdf";

/// Handle to a file the provider is ingesting.
#[derive(Debug, Clone)]
struct RemoteFile {
    name: String,
    uri: String,
    state: String,
}

/// Gemini-backed [`ExtractionBackend`].
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    upload_url: String,
    poll_interval: Duration,
    poll_budget: u32,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            upload_url: GEMINI_UPLOAD_URL.to_string(),
            poll_interval: Duration::from_secs(EXTRACT_POLL_INTERVAL_SECS),
            poll_budget: EXTRACT_POLL_BUDGET,
        }
    }

    /// Construct from `GEMINI_API_KEY` / `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::Config("GEMINI_API_KEY not set".into()))?;
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| GEMINI_MODEL.to_string());
        Ok(Self::new(api_key, model))
    }

    /// Point the client at alternate endpoints (tests, proxies).
    pub fn with_base_urls(mut self, base_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self.upload_url = upload_url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_budget(mut self, budget: u32) -> Self {
        self.poll_budget = budget;
        self
    }

    async fn upload_file(&self, data: &[u8], display_name: &str) -> Result<RemoteFile> {
        let start_url = format!("{}?key={}", self.upload_url, self.api_key);
        let metadata = json!({ "file": { "display_name": display_name } });

        let init_res = self
            .client
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", PDF_MIME)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("upload init transport: {e}")))?;

        if !init_res.status().is_success() {
            return Err(upstream_error("upload init", init_res).await);
        }

        let upload_url = init_res
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::Extraction("upload init response missing upload URL".into()))?;

        let upload_res = self
            .client
            .post(&upload_url)
            .header("Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("upload transport: {e}")))?;

        if !upload_res.status().is_success() {
            return Err(upstream_error("upload", upload_res).await);
        }

        let body: JsonValue = upload_res
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("upload response body: {e}")))?;
        let file = body
            .get("file")
            .ok_or_else(|| Error::Extraction("upload response missing 'file'".into()))?;

        let name = json_str(file, "name")
            .ok_or_else(|| Error::Extraction("upload response missing file name".into()))?;
        let uri = json_str(file, "uri")
            .ok_or_else(|| Error::Extraction("upload response missing file uri".into()))?;
        let state = json_str(file, "state").unwrap_or_else(|| "PROCESSING".to_string());

        debug!(file_name = %name, state = %state, "extract: uploaded document");
        Ok(RemoteFile { name, uri, state })
    }

    /// Poll the file state every `poll_interval` until ACTIVE, within the
    /// poll budget. FAILED and an exhausted budget are both typed errors.
    async fn wait_until_active(&self, file: &RemoteFile) -> Result<()> {
        let mut state = file.state.clone();
        let mut attempts: u32 = 0;

        loop {
            match state.as_str() {
                "ACTIVE" => {
                    debug!(file_name = %file.name, poll_attempts = attempts, "extract: file active");
                    return Ok(());
                }
                "FAILED" => {
                    return Err(Error::Extraction(
                        "provider failed to process the uploaded file".into(),
                    ));
                }
                _ => {}
            }

            if attempts >= self.poll_budget {
                return Err(Error::ExtractionTimeout(format!(
                    "file {} not active after {} polls",
                    file.name, attempts
                )));
            }
            sleep(self.poll_interval).await;
            attempts += 1;

            let check_url = format!("{}/{}?key={}", self.base_url, file.name, self.api_key);
            let res = self
                .client
                .get(&check_url)
                .send()
                .await
                .map_err(|e| Error::Extraction(format!("file poll transport: {e}")))?;
            if !res.status().is_success() {
                return Err(upstream_error("file poll", res).await);
            }
            let body: JsonValue = res
                .json()
                .await
                .map_err(|e| Error::Extraction(format!("file poll body: {e}")))?;
            let file_obj = body.get("file").unwrap_or(&body);
            state = json_str(file_obj, "state").unwrap_or_else(|| "PROCESSING".to_string());
        }
    }

    async fn generate(&self, file_uri: &str, analysis_type: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"file_data": {"mime_type": PDF_MIME, "file_uri": file_uri}},
                    {"text": analysis_prompt(analysis_type)}
                ]
            }],
            "generationConfig": {"response_mime_type": "application/json"}
        });

        let res = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("generate transport: {e}")))?;
        if !res.status().is_success() {
            return Err(upstream_error("generate", res).await);
        }

        let body: JsonValue = res
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("generate body: {e}")))?;
        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Extraction("model returned no text candidate".into()))
    }

    /// Best-effort deletion of the remote file. Never fails the pipeline.
    async fn delete_file(&self, name: &str) {
        let url = format!("{}/{}?key={}", self.base_url, name, self.api_key);
        match self.client.delete(&url).send().await {
            Ok(res) if res.status().is_success() => {
                debug!(file_name = %name, "extract: remote file deleted");
            }
            Ok(res) => {
                warn!(file_name = %name, status = %res.status(), "extract: remote delete refused");
            }
            Err(e) => {
                warn!(file_name = %name, error = %e, "extract: remote delete failed");
            }
        }
    }
}

#[async_trait]
impl ExtractionBackend for GeminiBackend {
    async fn extract(
        &self,
        pdf: &[u8],
        display_name: &str,
        analysis_type: &str,
    ) -> Result<ExtractionReport> {
        let file = self.upload_file(pdf, display_name).await?;

        // Cleanup runs on every path once the upload exists.
        let outcome = async {
            self.wait_until_active(&file).await?;
            let raw = self.generate(&file.uri, analysis_type).await?;
            debug!(response_len = raw.len(), "extract: model responded");
            parse_report(&raw)
        }
        .await;
        self.delete_file(&file.name).await;

        let report = outcome?;
        info!(
            display_name = %display_name,
            health_score = report.summary.financial_health_score,
            "extract: document analyzed"
        );
        Ok(report)
    }
}

fn json_str(v: &JsonValue, key: &str) -> Option<String> {
    v.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

async fn upstream_error(op: &str, res: reqwest::Response) -> Error {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    Error::Extraction(format!("{op} failed with {status}: {excerpt}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> GeminiBackend {
        GeminiBackend::new("test-key", "gemini-test")
            .with_base_urls(server.uri(), format!("{}/upload/files", server.uri()))
            .with_poll_interval(Duration::from_millis(1))
    }

    async fn mount_upload(server: &MockServer, state: &str) {
        Mock::given(method("POST"))
            .and(path("/upload/files"))
            .and(header("X-Goog-Upload-Protocol", "resumable"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-goog-upload-url", format!("{}/resumable", server.uri()).as_str()),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/resumable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"name": "files/abc123", "uri": "gs://files/abc123", "state": state}
            })))
            .mount(server)
            .await;
    }

    fn report_response(payload: JsonValue) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": payload.to_string()}]}}]
        }))
    }

    #[tokio::test]
    async fn test_extract_happy_path_uploads_generates_and_deletes() {
        let server = MockServer::start().await;
        mount_upload(&server, "ACTIVE").await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(body_partial_json(json!({
                "generationConfig": {"response_mime_type": "application/json"}
            })))
            .respond_with(report_response(json!({
                "summary": {"total_income": 5000.0, "total_expenses": 3200.0}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/files/abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let report = backend_for(&server)
            .extract(b"%PDF-1.7", "jan.pdf", "comprehensive")
            .await
            .unwrap();
        assert_eq!(report.summary.total_income, 5000.0);
        assert_eq!(report.summary.effective_net_cash_flow(), 1800.0);
    }

    #[tokio::test]
    async fn test_extract_sends_requested_analysis_type_in_prompt() {
        let server = MockServer::start().await;
        mount_upload(&server, "ACTIVE").await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(body_string_contains("a tax_review analysis"))
            .respond_with(report_response(json!({"summary": {}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/files/.+"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        backend_for(&server)
            .extract(b"%PDF-1.7", "jan.pdf", "tax_review")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_extract_polls_until_active() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/files/abc123$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"state": "ACTIVE"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(report_response(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let report = backend_for(&server)
            .extract(b"%PDF-1.7", "jan.pdf", "comprehensive")
            .await
            .unwrap();
        assert_eq!(report.summary.financial_health_score, 50.0);
    }

    #[tokio::test]
    async fn test_extract_fails_when_provider_reports_failed() {
        let server = MockServer::start().await;
        mount_upload(&server, "FAILED").await;
        // Cleanup still runs on the failure path.
        Mock::given(method("DELETE"))
            .and(path("/files/abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .extract(b"%PDF-1.7", "jan.pdf", "comprehensive")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)), "{err}");
    }

    #[tokio::test]
    async fn test_extract_times_out_after_poll_budget() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/files/abc123$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"state": "PROCESSING"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .with_poll_budget(3)
            .extract(b"%PDF-1.7", "jan.pdf", "comprehensive")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExtractionTimeout(_)), "{err}");
    }

    #[tokio::test]
    async fn test_extract_delete_failure_does_not_mask_success() {
        let server = MockServer::start().await;
        mount_upload(&server, "ACTIVE").await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(report_response(json!({"detailed_analysis": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let report = backend_for(&server)
            .extract(b"%PDF-1.7", "jan.pdf", "comprehensive")
            .await
            .unwrap();
        assert_eq!(report.detailed_analysis, "ok");
    }

    #[tokio::test]
    async fn test_extract_unparseable_response_is_hard_error() {
        let server = MockServer::start().await;
        mount_upload(&server, "ACTIVE").await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "sorry, not today"}]}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .extract(b"%PDF-1.7", "jan.pdf", "comprehensive")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)), "{err}");
    }
}
