// inputclean-core/tests/policy_config_tests.rs
use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;

use inputclean_core::config::{merge_policy, CharacterFilter, Policy, PolicyOverride, TagPolicy};

#[test]
fn test_load_default_policy() {
    let policy = Policy::load_default().unwrap();
    for name in ["email", "url", "string", "html", "blacklist", "anything", "skip"] {
        assert!(policy.class(name).is_some(), "missing class {}", name);
    }
    assert_eq!(policy.fields.last().unwrap().pattern, "*");
    assert_eq!(policy.class("string").unwrap().tokenize, vec!["emailInArrows".to_string()]);
    assert_eq!(policy.class("html").unwrap().tokenize, vec!["emailInArrows".to_string()]);
    assert!(policy.class("html").unwrap().strip_scripts);
    assert_eq!(policy.xss_patterns.len(), inputclean_core::DEFAULT_XSS_PATTERNS.len());
    policy.validate().unwrap();
}

#[test]
fn test_load_from_file() -> Result<()> {
    let yaml_content = r#"
fields:
  - pattern: 'Post.body'
    class: rich
  - pattern: 'Post.*'
    kind: exact
    class: plain
classes:
  rich:
    strip_tags: [b, i, a]
    filter: raw_html
    xss: true
  plain:
    strip_tags: true
    filter: string
    filter_options:
      encode_quotes: true
    xss: true
"#;
    let mut file = NamedTempFile::new()?;
    file.write_all(yaml_content.as_bytes())?;
    let policy = Policy::load_from_file(file.path())?;

    assert_eq!(policy.fields.len(), 2);
    assert_eq!(
        policy.fields[1].kind,
        Some(inputclean_core::PatternKind::Exact)
    );
    let rich = policy.class("rich").unwrap();
    assert_eq!(
        rich.strip_tags,
        TagPolicy::Allow(vec!["b".to_string(), "i".to_string(), "a".to_string()])
    );
    assert_eq!(rich.filter, CharacterFilter::RawHtml);
    assert!(policy.class("plain").unwrap().filter_options.encode_quotes);
    assert!(!policy.xss_patterns.is_empty());
    Ok(())
}

#[test]
fn test_load_from_file_rejects_unknown_class() -> Result<()> {
    let yaml_content = r#"
fields:
  - pattern: '*'
    class: nonexistent
classes: {}
"#;
    let mut file = NamedTempFile::new()?;
    file.write_all(yaml_content.as_bytes())?;
    let err = Policy::load_from_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("nonexistent"));
    Ok(())
}

#[test]
fn test_load_from_missing_file() {
    assert!(Policy::load_from_file("/definitely/not/here.yaml").is_err());
}

#[test]
fn test_merge_policy_override_wins() -> Result<()> {
    let override_yaml = r#"
fields:
  - pattern: '*'
    class: anything
  - pattern: 'Model.bio'
    class: html
classes:
  string:
    filter_options:
      encode_high: false
      strip_high: true
  custom:
    filter: email
xss_patterns: []
tokenizations:
  hashtag: '/#[a-z]+/'
"#;
    let mut file = NamedTempFile::new()?;
    file.write_all(override_yaml.as_bytes())?;
    let overrides = PolicyOverride::load_from_file(file.path())?;

    let base = Policy::load_default()?;
    let base_rules = base.fields.len();
    let merged = merge_policy(base, &overrides);

    // `*` replaced in place, `Model.bio` appended.
    assert_eq!(merged.fields.len(), base_rules + 1);
    assert_eq!(merged.fields.iter().find(|r| r.pattern == "*").unwrap().class, "anything");
    assert_eq!(merged.fields.last().unwrap().pattern, "Model.bio");

    // Per-flag class merge keeps untouched flags.
    let string = merged.class("string").unwrap();
    assert!(string.filter_options.strip_high);
    assert!(!string.filter_options.encode_high);
    assert_eq!(string.filter, CharacterFilter::String);
    assert!(string.xss);

    assert_eq!(merged.class("custom").unwrap().filter, CharacterFilter::Email);
    assert!(merged.xss_patterns.is_empty());
    assert!(merged.tokenizations.contains_key("hashtag"));
    assert!(merged.tokenizations.contains_key("emailInArrows"));
    merged.validate().unwrap();
    Ok(())
}

#[test]
fn test_empty_override_is_noop() {
    let base = Policy::load_default().unwrap();
    let overrides: PolicyOverride = serde_json::from_str("{}").unwrap();
    assert!(overrides.is_empty());
    assert_eq!(merge_policy(base.clone(), &overrides), base);
}
