//! headless.rs - Convenience wrappers for one-shot cleaning without managing an engine.
//!
//! Each call builds a `PolicyEngine`; compiled base policies are cached, so
//! repeated calls with the same policy only pay for the clean itself.
//!
//! License: MIT OR APACHE 2.0

use crate::config::{Policy, PolicyOverride};
use crate::engine::SanitizationEngine;
use crate::engines::policy_engine::PolicyEngine;
use crate::errors::InputCleanError;
use serde_json::Value;

/// Cleans a whole record with the embedded default policy.
pub fn clean_record(record: &Value) -> Result<Value, InputCleanError> {
    PolicyEngine::with_default_policy()?.clean_all(record, None)
}

/// Cleans a whole record with `policy`, optionally merged with `overrides`.
///
/// # Arguments
///
/// * `policy` - The base policy.
/// * `overrides` - Per-call changes merged over `policy`.
/// * `record` - The nested input record.
pub fn clean_record_with(
    policy: Policy,
    overrides: Option<&PolicyOverride>,
    record: &Value,
) -> Result<Value, InputCleanError> {
    PolicyEngine::new(policy)?.clean_all(record, overrides)
}

/// Cleans one string with a named class of the default policy.
pub fn clean_string(value: &str, class_name: &str) -> Result<String, InputCleanError> {
    let engine = PolicyEngine::with_default_policy()?;
    Ok(engine.clean(value, class_name)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    use crate::config::FieldRule;

    #[test]
    fn test_clean_record_default_policy() -> Result<()> {
        let record = json!({
            "abc": "abc",
            "Model": {
                "name": "input cleaner <strong>nohtml</strong>",
                "email": "valid@example.com",
            }
        });
        let cleaned = clean_record(&record)?;
        assert_eq!(
            cleaned,
            json!({
                "abc": "abc",
                "Model": {"name": "input cleaner nohtml", "email": "valid@example.com"}
            })
        );
        Ok(())
    }

    #[test]
    fn test_clean_string_rejects_payload() {
        let result = clean_string("javascript:alert(1)", "string");
        assert!(matches!(result, Err(InputCleanError::UnsafeInput(_))));
    }

    #[test]
    fn test_clean_record_with_override() -> Result<()> {
        let mut policy = Policy::load_default()?;
        policy.fields.clear();
        let overrides = PolicyOverride {
            fields: vec![FieldRule::new("keep", "anything")],
            ..Default::default()
        };
        let record = json!({"keep": "<b>x</b>", "other": "<b>y</b>"});
        let cleaned = clean_record_with(policy, Some(&overrides), &record)?;
        assert_eq!(cleaned, json!({"keep": "<b>x</b>", "other": "<b>y</b>"}));
        Ok(())
    }
}
