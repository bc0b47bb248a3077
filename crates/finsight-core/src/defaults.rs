//! Centralized default constants for the finsight system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// UPLOADS
// =============================================================================

/// Maximum upload size in bytes (50 MB).
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// The only accepted upload content type.
pub const ALLOWED_CONTENT_TYPE: &str = "application/pdf";

/// The only accepted upload file extension (lowercase, without dot).
pub const ALLOWED_EXTENSION: &str = "pdf";

// =============================================================================
// EXTRACTION
// =============================================================================

/// Seconds between remote file-state polls while the provider ingests a PDF.
pub const EXTRACT_POLL_INTERVAL_SECS: u64 = 2;

/// Maximum number of file-state polls before giving up (~60s at 2s each).
pub const EXTRACT_POLL_BUDGET: u32 = 30;

/// Model version label stamped on every analysis record.
pub const MODEL_VERSION: &str = "gemini-pro-v1";

/// Default Gemini model used when GEMINI_MODEL is unset.
pub const GEMINI_MODEL: &str = "gemini-1.5-pro";

/// Neutral financial health score used when the model omits one.
pub const HEALTH_SCORE_DEFAULT: f64 = 50.0;

/// Analysis type recorded when the client does not specify one.
pub const ANALYSIS_TYPE_DEFAULT: &str = "comprehensive";

// =============================================================================
// JOBS
// =============================================================================

/// Default maximum retries for failed jobs.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Default worker polling interval in milliseconds.
pub const JOB_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of jobs a worker claims per poll.
pub const JOB_BATCH_SIZE: usize = 4;

/// Default per-job execution timeout in seconds.
pub const JOB_TIMEOUT_SECS: u64 = 600;

/// Statements stuck in `processing` longer than this are failed by the sweep.
pub const STUCK_PROCESSING_SECS: u64 = 3600;

/// Seconds between stuck-processing sweeps.
pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// Message recorded on statements failed by the sweep.
pub const STUCK_PROCESSING_MESSAGE: &str = "Processing timeout - task may have failed";

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for list endpoints.
pub const PAGE_SIZE: i64 = 20;

/// Maximum page size a client may request.
pub const PAGE_SIZE_MAX: i64 = 100;

// =============================================================================
// AUTH
// =============================================================================

/// Access token lifetime in minutes.
pub const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;

/// Refresh token lifetime in days.
pub const REFRESH_TOKEN_EXPIRE_DAYS: i64 = 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_budget_covers_a_minute() {
        assert!(EXTRACT_POLL_BUDGET as u64 * EXTRACT_POLL_INTERVAL_SECS >= 60);
    }

    #[test]
    fn test_page_size_within_max() {
        assert!(PAGE_SIZE <= PAGE_SIZE_MAX);
    }
}
