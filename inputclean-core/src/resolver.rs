//! resolver.rs - Maps a field path to the name of the class that cleans it.
//!
//! License: MIT OR APACHE 2.0

use log::debug;

use crate::sanitizers::compiler::CompiledPolicy;

/// Returns the class of the first rule matching `field_path`.
///
/// Rules are evaluated in the compiled order (declared order, wildcard rules
/// last). `None` means the field is not covered and passes through untouched.
pub fn resolve<'a>(field_path: &str, policy: &'a CompiledPolicy) -> Option<&'a str> {
    let class = policy
        .rules
        .iter()
        .find(|rule| rule.key.matches(field_path))
        .map(|rule| rule.class.as_str());
    match class {
        Some(name) => debug!("Field '{}' resolved to class '{}'.", field_path, name),
        None => debug!("Field '{}' matched no rule.", field_path),
    }
    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldRule, Policy};
    use crate::matcher::PatternKind;
    use crate::sanitizers::compiler::compile_policy;

    fn policy_with(fields: Vec<FieldRule>) -> CompiledPolicy {
        let mut policy = Policy::load_default().unwrap();
        policy.fields = fields;
        compile_policy(&policy).unwrap()
    }

    #[test]
    fn test_default_policy_routes_by_suffix() {
        let compiled = compile_policy(&Policy::load_default().unwrap()).unwrap();
        assert_eq!(resolve("Model.email", &compiled), Some("email"));
        assert_eq!(resolve("Model.0.url", &compiled), Some("url"));
        assert_eq!(resolve("Model.name", &compiled), Some("string"));
        assert_eq!(resolve("email", &compiled), Some("string"));
        assert_eq!(resolve("", &compiled), None);
    }

    #[test]
    fn test_first_declared_match_wins() {
        let compiled = policy_with(vec![
            FieldRule::new("Model.html", "html"),
            FieldRule::new(r"/.*\.html$/", "anything"),
        ]);
        assert_eq!(resolve("Model.html", &compiled), Some("html"));
        assert_eq!(resolve("Other.html", &compiled), Some("anything"));
    }

    #[test]
    fn test_wildcard_evaluated_last_wherever_declared() {
        let compiled = policy_with(vec![
            FieldRule::new("*", "string"),
            FieldRule::new("Model.*", "html"),
        ]);
        assert_eq!(resolve("Model.body", &compiled), Some("html"));
        assert_eq!(resolve("body", &compiled), Some("string"));
    }

    #[test]
    fn test_no_wildcard_leaves_field_uncovered() {
        let compiled = policy_with(vec![FieldRule::new("Model.email", "email")]);
        assert_eq!(resolve("Model.name", &compiled), None);
    }

    #[test]
    fn test_explicit_kind() {
        let mut rule = FieldRule::new("Model.*", "html");
        rule.kind = Some(PatternKind::Exact);
        let compiled = policy_with(vec![rule]);
        assert_eq!(resolve("Model.body", &compiled), None);
        assert_eq!(resolve("Model.*", &compiled), Some("html"));
    }
}
