//! Structured logging schema and field name constants for finsight.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → job → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "storage", "extract", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "gemini", "orchestrator", "worker", "sweeper", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "upload", "extract", "claim_next", "sweep"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Statement UUID being operated on.
pub const STATEMENT_ID: &str = "statement_id";

/// Analysis UUID being operated on.
pub const ANALYSIS_ID: &str = "analysis_id";

/// Owning user UUID.
pub const USER_ID: &str = "user_id";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job type enum variant.
pub const JOB_TYPE: &str = "job_type";

/// Remote storage public id.
pub const PUBLIC_ID: &str = "public_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Upload/document size in bytes.
pub const FILE_SIZE: &str = "file_size";

/// Number of poll attempts consumed waiting for remote ingestion.
pub const POLL_ATTEMPTS: &str = "poll_attempts";

/// Number of items affected by a bulk operation or sweep.
pub const AFFECTED: &str = "affected";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Pipeline fields ───────────────────────────────────────────────────────

/// Orchestration stage name ("load", "transition", "fetch_bytes",
/// "extract", "compute", "backfill", "persist", "complete").
pub const STAGE: &str = "stage";

/// Statement status value after a transition.
pub const STATUS: &str = "status";
