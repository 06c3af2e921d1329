//! loggable.rs - Keeps raw field values out of debug logs.
//!
//! Values are user input and may hold personal data or live attack payloads.
//! They are only ever logged through `loggable_value`, which masks them unless
//! `INPUTCLEAN_ALLOW_DEBUG_PII=true` is set in the environment.
//!
//! License: MIT OR APACHE 2.0

use lazy_static::lazy_static;
use log::{debug, warn};

use crate::errors::UnsafeInputError;

lazy_static! {
    /// Read once; changing the variable after the first log call has no effect.
    static ref PII_DEBUG_ALLOWED: bool = {
        std::env::var("INPUTCLEAN_ALLOW_DEBUG_PII")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

pub fn redact_value(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", s.len())
    }
}

fn loggable_value(value: &str) -> String {
    if *PII_DEBUG_ALLOWED {
        value.to_string()
    } else {
        redact_value(value)
    }
}

/// Traces a value that a class changed.
pub fn log_field_change_debug(field: &str, class: &str, original: &str, cleaned: &str) {
    debug!(
        "Field '{}' cleaned by class '{}': Original='{}', Cleaned='{}'",
        field,
        class,
        loggable_value(original),
        loggable_value(cleaned)
    );
}

/// Reports a rejection. Only the field path and fingerprint are written.
pub fn log_rejection(err: &UnsafeInputError) {
    warn!(
        "Rejected unsafe input in field '{}' (hash: {}).",
        err.field.as_deref().unwrap_or("-"),
        err.fingerprint
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_value_short_string() {
        assert_eq!(redact_value("abc"), "[REDACTED]".to_string());
    }

    #[test]
    fn test_redact_value_long_string() {
        assert_eq!(redact_value("<script>alert(1)</script>"), "[REDACTED: 25 chars]".to_string());
    }
}
