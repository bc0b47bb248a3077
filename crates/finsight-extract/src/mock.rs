//! Scripted extraction backend for orchestration tests.

use std::sync::Mutex;

use async_trait::async_trait;

use finsight_core::{Error, Result};

use crate::schema::ExtractionReport;
use crate::ExtractionBackend;

/// Returns queued outcomes in order; repeats the last one when drained.
#[derive(Default)]
pub struct MockExtractionBackend {
    script: Mutex<Vec<Result<ExtractionReport>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockExtractionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(report: ExtractionReport) -> Self {
        let mock = Self::new();
        mock.push_ok(report);
        mock
    }

    pub fn with_error(error: Error) -> Self {
        let mock = Self::new();
        mock.push_err(error);
        mock
    }

    pub fn push_ok(&self, report: ExtractionReport) {
        self.script.lock().unwrap().push(Ok(report));
    }

    pub fn push_err(&self, error: Error) {
        self.script.lock().unwrap().push(Err(error));
    }

    /// Display names passed to `extract`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Analysis types passed to `extract`, in call order.
    pub fn analysis_types(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, kind)| kind.clone())
            .collect()
    }
}

#[async_trait]
impl ExtractionBackend for MockExtractionBackend {
    async fn extract(
        &self,
        _pdf: &[u8],
        display_name: &str,
        analysis_type: &str,
    ) -> Result<ExtractionReport> {
        self.calls
            .lock()
            .unwrap()
            .push((display_name.to_string(), analysis_type.to_string()));
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(Error::Extraction("mock backend has no scripted result".into()));
        }
        if script.len() == 1 {
            // Clone-and-keep so repeated calls stay scripted.
            return match &script[0] {
                Ok(report) => Ok(report.clone()),
                Err(e) => Err(Error::Extraction(e.to_string())),
            };
        }
        script.remove(0)
    }
}
