//! Error types for finsight.

use thiserror::Error;

/// Result type alias using finsight's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for finsight operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Statement not found
    #[error("Statement not found: {0}")]
    StatementNotFound(uuid::Uuid),

    /// Analysis not found
    #[error("Analysis not found: {0}")]
    AnalysisNotFound(uuid::Uuid),

    /// Request rejected before any side effect (bad upload, invalid input)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Remote object storage interaction failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// AI extraction failed (upload, poll, generation, or unparseable output)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Extraction exceeded its polling budget
    #[error("Extraction timed out: {0}")]
    ExtractionTimeout(String),

    /// Analysis pipeline failed at a known stage
    #[error("Orchestration error at {stage}: {message}")]
    Orchestration { stage: String, message: String },

    /// Extracted payload failed schema validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Illegal document status transition
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an orchestration error carrying the pipeline stage name.
    pub fn orchestration(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Orchestration {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// True for errors that should surface as a client-side 4xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Precondition(_)
                | Error::InvalidInput(_)
                | Error::InvalidTransition(_)
                | Error::NotFound(_)
                | Error::StatementNotFound(_)
                | Error::AnalysisNotFound(_)
                | Error::Unauthorized(_)
                | Error::Forbidden(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
