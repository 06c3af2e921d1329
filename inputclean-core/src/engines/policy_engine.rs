// inputclean-core/src/engines/policy_engine.rs
//! A `SanitizationEngine` implementation driven by a `Policy`.
//!
//! The engine holds the active policy as an `Arc` behind a `RwLock`. Cleaning
//! takes a snapshot of the `Arc` and never holds the lock while filtering, so
//! `set_policy` can swap in a newly compiled policy at any time and in-flight
//! calls finish against the policy they started with.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{merge_policy, Policy, PolicyOverride, SanitizationClass};
use crate::engine::SanitizationEngine;
use crate::errors::{InputCleanError, UnsafeInputError};
use crate::filters;
use crate::loggable::{log_field_change_debug, log_rejection};
use crate::record;
use crate::resolver::resolve;
use crate::sanitizers::compiler::{compile_policy, get_or_compile_policy, CompiledClass, CompiledPolicy};

/// The source policy together with its compiled form.
#[derive(Debug)]
struct ActivePolicy {
    source: Policy,
    compiled: Arc<CompiledPolicy>,
}

#[derive(Debug)]
pub struct PolicyEngine {
    active: RwLock<Arc<ActivePolicy>>,
}

impl PolicyEngine {
    /// Validates and compiles `policy` and makes it the active policy.
    pub fn new(policy: Policy) -> Result<Self, InputCleanError> {
        let compiled = get_or_compile_policy(&policy)?;
        debug!("PolicyEngine created with {} field rules.", compiled.rules.len());
        Ok(Self {
            active: RwLock::new(Arc::new(ActivePolicy { source: policy, compiled })),
        })
    }

    /// An engine running the embedded default policy.
    pub fn with_default_policy() -> Result<Self, InputCleanError> {
        Self::new(Policy::load_default()?)
    }

    fn snapshot(&self) -> Arc<ActivePolicy> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The compiled form of the active policy.
    pub fn compiled_policy(&self) -> Arc<CompiledPolicy> {
        Arc::clone(&self.snapshot().compiled)
    }

    /// Cleans one string with a class given inline instead of by name.
    ///
    /// Named tokenize entries resolve against the active policy's table.
    pub fn clean_with_class(&self, value: &str, class: &SanitizationClass) -> Result<String, UnsafeInputError> {
        let active = self.snapshot();
        let compiled = CompiledClass::compile("inline", class, &active.source.tokenizations);
        filters::apply(value, &compiled, &active.compiled.signatures)
    }
}

impl SanitizationEngine for PolicyEngine {
    fn clean_all(&self, record: &Value, overrides: Option<&PolicyOverride>) -> Result<Value, InputCleanError> {
        let active = self.snapshot();
        let compiled = match overrides {
            Some(o) if !o.is_empty() => {
                debug!("Applying per-call policy override.");
                Arc::new(compile_policy(&merge_policy(active.source.clone(), o))?)
            }
            _ => Arc::clone(&active.compiled),
        };

        let leaves = record::flatten(record);
        debug!("clean_all: {} leaves.", leaves.len());
        let mut cleaned = Vec::with_capacity(leaves.len());
        for (path, leaf) in leaves {
            let field = path.to_string();
            let value = clean_value(leaf, &field, &compiled)?;
            cleaned.push((path, value));
        }
        Ok(record::expand(cleaned))
    }

    fn clean_field(&self, value: &Value, field_path: &str) -> Result<Value, UnsafeInputError> {
        clean_value(value, field_path, &self.snapshot().compiled)
    }

    fn clean(&self, value: &str, class_name: &str) -> Result<String, UnsafeInputError> {
        let active = self.snapshot();
        match active.compiled.class(class_name) {
            Some(class) => filters::apply(value, class, &active.compiled.signatures),
            None => {
                debug!("Unknown class '{}'; value left unchanged.", class_name);
                Ok(value.to_string())
            }
        }
    }

    fn policy(&self) -> Policy {
        self.snapshot().source.clone()
    }

    fn set_policy(&self, overrides: PolicyOverride) -> Result<(), InputCleanError> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let merged = merge_policy(active.source.clone(), &overrides);
        let compiled = get_or_compile_policy(&merged)?;
        info!(
            "Active policy replaced: {} field rules, {} classes.",
            merged.fields.len(),
            merged.classes.len()
        );
        *active = Arc::new(ActivePolicy { source: merged, compiled });
        Ok(())
    }
}

/// Cleans a value at `field_path`, descending into containers.
fn clean_value(value: &Value, field_path: &str, policy: &CompiledPolicy) -> Result<Value, UnsafeInputError> {
    match value {
        Value::String(s) => clean_string(s, field_path, policy).map(Value::String),
        Value::Array(items) => items
            .iter()
            .map(|item| clean_value(item, field_path, policy))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), clean_value(v, field_path, policy)?)))
            .collect::<Result<Map<String, Value>, UnsafeInputError>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn clean_string(value: &str, field_path: &str, policy: &CompiledPolicy) -> Result<String, UnsafeInputError> {
    let Some(class) = resolve(field_path, policy).and_then(|name| policy.class(name)) else {
        return Ok(value.to_string());
    };
    let cleaned = filters::apply(value, class, &policy.signatures).map_err(|e| {
        let e = e.with_field(field_path);
        log_rejection(&e);
        e
    })?;
    if cleaned != value {
        log_field_change_debug(field_path, &class.name, value, &cleaned);
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    use crate::config::{CharacterFilter, ClassOverride, FieldRule, TagPolicy};
    use crate::sanitizers::compiler::is_cached;

    fn engine() -> PolicyEngine {
        PolicyEngine::with_default_policy().unwrap()
    }

    #[test]
    fn test_clean_unknown_class_is_noop() {
        let e = engine();
        assert_eq!(e.clean("<b>x</b>", "no-such-class").unwrap(), "<b>x</b>");
        assert_eq!(e.clean("<b>x</b>", "string").unwrap(), "x");
    }

    #[test]
    fn test_clean_field_applies_parent_path_to_children() {
        let e = engine();
        let value = json!(["a\nb@example.com", {"x": "c d@example.com"}, 7, null]);
        assert_eq!(
            e.clean_field(&value, "Model.email").unwrap(),
            json!(["ab@example.com", {"x": "cd@example.com"}, 7, null])
        );
    }

    #[test]
    fn test_clean_field_error_carries_path() {
        let err = engine()
            .clean_field(&json!("javascript:alert(1)"), "Model.url")
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("Model.url"));
    }

    #[test]
    fn test_set_policy_swaps_rules() {
        let e = engine();
        e.set_policy(PolicyOverride {
            fields: vec![FieldRule::new("Model.body", "html")],
            ..Default::default()
        })
        .unwrap();
        let out = e.clean_field(&json!("<b>kept</b>"), "Model.body").unwrap();
        assert_eq!(out, json!("<b>kept</b>"));
        assert!(e.policy().fields.iter().any(|r| r.pattern == "Model.body"));
    }

    #[test]
    fn test_invalid_set_policy_keeps_previous() {
        let e = engine();
        let before = e.policy();
        let result = e.set_policy(PolicyOverride {
            fields: vec![FieldRule::new("Model.body", "missing")],
            ..Default::default()
        });
        assert!(matches!(result, Err(InputCleanError::UnknownClass(_, _))));
        assert_eq!(e.policy(), before);
    }

    #[test]
    fn test_set_policy_class_flags() {
        let e = engine();
        let mut classes = BTreeMap::new();
        classes.insert(
            "string".to_string(),
            ClassOverride {
                strip_tags: Some(TagPolicy::Toggle(false)),
                filter: Some(CharacterFilter::None),
                xss: Some(false),
                ..Default::default()
            },
        );
        e.set_policy(PolicyOverride { classes, ..Default::default() }).unwrap();
        assert_eq!(e.clean("<b>x</b>", "string").unwrap(), "<b>x</b>");
    }

    #[test]
    fn test_clean_with_inline_class() {
        let e = engine();
        let class = SanitizationClass {
            filter: CharacterFilter::String,
            tokenize: vec!["emailInArrows".to_string()],
            xss: true,
            ..Default::default()
        };
        assert_eq!(
            e.clean_with_class("<a@example.com> <i>hi</i>", &class).unwrap(),
            "<a@example.com> hi"
        );
        let detect = SanitizationClass { xss: true, ..Default::default() };
        assert!(e.clean_with_class("javascript:alert(1)", &detect).is_err());
    }

    #[test]
    fn test_per_call_overrides_are_not_cached() {
        let e = engine();
        let record = json!({"Request": {"note": "<b>x</b>"}});
        for i in 0..20 {
            let overrides = PolicyOverride {
                fields: vec![FieldRule::new(&format!("Request.scoped{}", i), "anything")],
                ..Default::default()
            };
            let cleaned = e.clean_all(&record, Some(&overrides)).unwrap();
            assert_eq!(cleaned, json!({"Request": {"note": "x"}}));
            assert!(!is_cached(&merge_policy(e.policy(), &overrides)));
        }
        assert!(is_cached(&e.policy()));
    }
}
