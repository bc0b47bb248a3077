//! Upload precondition checks for statement PDFs.
//!
//! Multi-layer validation, cheapest first:
//! 1. Extension allowlist (`.pdf` only)
//! 2. Declared content type (`application/pdf` only)
//! 3. Size bounds (non-empty, ≤ 50 MB)
//! 4. Magic bytes (`%PDF`)
//!
//! Every rejection happens before any storage or database side effect.

use crate::defaults::{ALLOWED_CONTENT_TYPE, ALLOWED_EXTENSION, MAX_FILE_SIZE};
use crate::error::{Error, Result};

/// Leading bytes of every well-formed PDF.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// Result of upload validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub allowed: bool,
    pub block_reason: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            block_reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason.into()),
        }
    }
}

/// Validate an upload candidate against all preconditions.
pub fn validate_upload(
    filename: &str,
    declared_content_type: &str,
    data: &[u8],
) -> ValidationResult {
    let ext = filename.rsplit('.').next().unwrap_or_default().to_lowercase();
    if !filename.contains('.') || ext != ALLOWED_EXTENSION {
        return ValidationResult::blocked(format!(
            "Only .{ALLOWED_EXTENSION} files are accepted, got '{filename}'"
        ));
    }

    if !declared_content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .eq_ignore_ascii_case(ALLOWED_CONTENT_TYPE)
    {
        return ValidationResult::blocked(format!(
            "Content type must be {ALLOWED_CONTENT_TYPE}, got '{declared_content_type}'"
        ));
    }

    if data.is_empty() {
        return ValidationResult::blocked("File is empty");
    }

    if data.len() > MAX_FILE_SIZE {
        return ValidationResult::blocked(format!(
            "File exceeds maximum size of {MAX_FILE_SIZE} bytes"
        ));
    }

    if !data.starts_with(PDF_MAGIC) {
        return ValidationResult::blocked("File does not look like a PDF (bad magic bytes)");
    }

    ValidationResult::allowed()
}

/// Validate and convert into a `Result` for call sites that propagate.
pub fn ensure_valid_upload(filename: &str, content_type: &str, data: &[u8]) -> Result<()> {
    let v = validate_upload(filename, content_type, data);
    if v.allowed {
        Ok(())
    } else {
        Err(Error::Precondition(
            v.block_reason.unwrap_or_else(|| "upload rejected".into()),
        ))
    }
}

/// Strip path components and shell-hostile characters from a client filename.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: &[u8] = b"%PDF-1.7 fake body";

    #[test]
    fn test_accepts_valid_pdf() {
        let v = validate_upload("statement.pdf", "application/pdf", PDF);
        assert!(v.allowed);
    }

    #[test]
    fn test_accepts_content_type_with_charset() {
        let v = validate_upload("a.pdf", "application/pdf; charset=binary", PDF);
        assert!(v.allowed);
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let v = validate_upload("statement.docx", "application/pdf", PDF);
        assert!(!v.allowed);
        assert!(v.block_reason.unwrap().contains(".pdf"));
    }

    #[test]
    fn test_rejects_missing_extension() {
        assert!(!validate_upload("statement", "application/pdf", PDF).allowed);
    }

    #[test]
    fn test_rejects_wrong_content_type() {
        let v = validate_upload("a.pdf", "text/plain", PDF);
        assert!(!v.allowed);
    }

    #[test]
    fn test_rejects_empty_file() {
        let v = validate_upload("a.pdf", "application/pdf", b"");
        assert_eq!(v.block_reason.unwrap(), "File is empty");
    }

    #[test]
    fn test_rejects_oversize() {
        let big = vec![b'x'; MAX_FILE_SIZE + 1];
        let v = validate_upload("a.pdf", "application/pdf", &big);
        assert!(!v.allowed);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let v = validate_upload("a.pdf", "application/pdf", b"MZ not a pdf");
        assert!(v.block_reason.unwrap().contains("magic"));
    }

    #[test]
    fn test_ensure_valid_upload_maps_to_precondition() {
        let err = ensure_valid_upload("a.exe", "application/pdf", PDF).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(sanitize_filename("C:\\docs\\jan 2024.pdf"), "jan_2024.pdf");
    }
}
