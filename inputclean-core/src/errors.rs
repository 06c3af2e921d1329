//! errors.rs - Custom error types for the inputclean-core library.
//!
//! `UnsafeInputError` is the only error raised while cleaning values. Every
//! other variant of `InputCleanError` surfaces while a policy is being loaded,
//! merged or compiled, never in the middle of a clean.
//!
//! License: MIT OR APACHE 2.0

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Raised when XSS detection fires for a field whose class requires it.
///
/// Carries a one-way fingerprint of the offending value so the rejection can
/// be audited without copying the payload into logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsafe input detected [field: {}, hash: {fingerprint}]", .field.as_deref().unwrap_or("-"))]
pub struct UnsafeInputError {
    /// Dotted path of the rejected field, if the value was cleaned as part of a record.
    pub field: Option<String>,
    /// Hex SHA-256 of the value as it stood when detection fired.
    pub fingerprint: String,
}

impl UnsafeInputError {
    pub fn new(value: &str) -> Self {
        Self {
            field: None,
            fingerprint: fingerprint(value),
        }
    }

    /// Attaches the field path, keeping one already set by a deeper call.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        if self.field.is_none() {
            self.field = Some(field.into());
        }
        self
    }
}

/// Content-derived fingerprint used in rejection reports.
pub fn fingerprint(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// This enum represents all possible error types in the `inputclean-core` library.
///
/// By using `#[non_exhaustive]`, we signal to consumers of this library that
/// new variants may be added in future versions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InputCleanError {
    #[error(transparent)]
    UnsafeInput(#[from] UnsafeInputError),

    #[error("Field rule '{0}' references unknown sanitization class '{1}'")]
    UnknownClass(String, String),

    #[error("Sanitization class '{0}' references unknown tokenization '{1}'")]
    UnknownTokenization(String, String),

    #[error("Pattern '{0}': length ({1}) exceeds maximum allowed ({2})")]
    PatternLengthExceeded(String, usize, usize),

    #[error("A critical system error occurred: {0}")]
    AnyhowWrapper(#[from] anyhow::Error),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsafe_input_message_hides_payload() {
        let payload = "<script>alert(1)</script>";
        let err = UnsafeInputError::new(payload).with_field("Model.body");
        let msg = err.to_string();
        assert!(!msg.contains("script"));
        assert!(msg.contains("Model.body"));
        assert!(msg.contains(&fingerprint(payload)));
    }

    #[test]
    fn test_with_field_keeps_innermost_path() {
        let err = UnsafeInputError::new("x")
            .with_field("Model.0.body")
            .with_field("Model");
        assert_eq!(err.field.as_deref(), Some("Model.0.body"));
    }

    #[test]
    fn test_policy_file_errors_surface_through_anyhow() {
        let load_err = crate::config::Policy::load_from_file("/no/such/policy.yaml").unwrap_err();
        let err = InputCleanError::from(load_err);
        assert!(matches!(err, InputCleanError::AnyhowWrapper(_)));
        assert!(err.to_string().contains("/no/such/policy.yaml"));
    }
}
