//! # finsight-extract
//!
//! AI extraction client for bank statements. A PDF goes in; a validated
//! [`schema::ExtractionReport`] comes out, or a typed error — extraction
//! never fabricates analysis content on failure.
//!
//! ## Example
//!
//! ```ignore
//! use finsight_extract::{ExtractionBackend, GeminiBackend};
//!
//! let backend = GeminiBackend::from_env()?;
//! let report = backend.extract(&pdf_bytes, "january.pdf", "comprehensive").await?;
//! println!("health score: {}", report.summary.financial_health_score);
//! ```

pub mod gemini;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod normalize;
pub mod prompt;
pub mod schema;

use async_trait::async_trait;

use finsight_core::defaults::MODEL_VERSION;
use finsight_core::Result;

pub use gemini::GeminiBackend;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockExtractionBackend;
pub use normalize::{parse_report, strip_code_fences};
pub use schema::{DocumentInfo, ExtractionReport, Summary};

/// Abstraction over document-understanding providers.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Analyze one PDF and return its validated report. `analysis_type`
    /// selects the prompt variant and is echoed on the persisted analysis.
    async fn extract(
        &self,
        pdf: &[u8],
        display_name: &str,
        analysis_type: &str,
    ) -> Result<ExtractionReport>;

    /// Version label stamped onto persisted analyses.
    fn model_version(&self) -> &str {
        MODEL_VERSION
    }
}
