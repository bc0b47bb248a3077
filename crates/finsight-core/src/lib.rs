//! # finsight-core
//!
//! Core types, traits, and abstractions for the finsight bank-statement
//! analysis backend.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other finsight crates depend on.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{ensure_valid_upload, sanitize_filename, validate_upload, ValidationResult};
pub use models::*;
pub use traits::*;
