//! Configuration management for `inputclean-core`.
//!
//! This module defines the policy data structures: the ordered field rules,
//! the named sanitization classes and the XSS signature list. It handles
//! deserialization of YAML policies, the embedded default policy, merging of
//! runtime overrides and validation of class and tokenization references.
//!
//! License: MIT OR Apache-2.0

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::InputCleanError;
use crate::matcher::PatternKind;
use crate::sanitizers::compiler::{compile_pattern, split_delimited};
use crate::tokenizer::builtin_tokenization;
use crate::xss::DEFAULT_XSS_PATTERNS;

/// Maximum allowed length for any pattern string in a policy.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Maps a field pattern to a sanitization class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FieldRule {
    /// Field path key: `*`, an exact path, a glob or a delimited regex.
    pub pattern: String,
    /// Explicit interpretation of `pattern`; inferred from its shape when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PatternKind>,
    /// Name of the sanitization class applied to matching fields.
    pub class: String,
}

impl FieldRule {
    pub fn new(pattern: &str, class: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: None,
            class: class.to_string(),
        }
    }
}

/// Tag stripping mode: off, strip everything, or strip all but the listed tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TagPolicy {
    Toggle(bool),
    Allow(Vec<String>),
}

impl Default for TagPolicy {
    fn default() -> Self {
        TagPolicy::Toggle(false)
    }
}

/// Character-class filter applied after tag handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterFilter {
    #[default]
    None,
    Email,
    Url,
    String,
    RawHtml,
}

/// Extra character handling applied after the class filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Remove characters below 0x20.
    pub strip_low: bool,
    /// Remove characters above 0x7F.
    pub strip_high: bool,
    /// Encode characters below 0x20 as `&#N;`.
    pub encode_low: bool,
    /// Encode characters above 0x7F as `&#N;`.
    pub encode_high: bool,
    /// Encode `&` as `&#38;`.
    pub encode_amp: bool,
    /// Encode `"` and `'` as numeric references.
    pub encode_quotes: bool,
}

/// A named bundle of filtering and validation behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizationClass {
    pub strip_tags: TagPolicy,
    /// Remove script-like elements and comments with their content.
    pub strip_scripts: bool,
    pub filter: CharacterFilter,
    pub filter_options: FilterOptions,
    /// Regexes whose matches are deleted, in order.
    pub blacklist: Vec<String>,
    /// Regexes, or names from the tokenization table, protected from filtering.
    pub tokenize: Vec<String>,
    /// Reject the value if XSS signatures remain after filtering.
    pub xss: bool,
}

/// Per-flag override of a sanitization class. Unset flags keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassOverride {
    pub strip_tags: Option<TagPolicy>,
    pub strip_scripts: Option<bool>,
    pub filter: Option<CharacterFilter>,
    pub filter_options: Option<FilterOptions>,
    pub blacklist: Option<Vec<String>>,
    pub tokenize: Option<Vec<String>>,
    pub xss: Option<bool>,
}

impl ClassOverride {
    fn apply_to(self, class: &mut SanitizationClass) {
        if let Some(v) = self.strip_tags {
            class.strip_tags = v;
        }
        if let Some(v) = self.strip_scripts {
            class.strip_scripts = v;
        }
        if let Some(v) = self.filter {
            class.filter = v;
        }
        if let Some(v) = self.filter_options {
            class.filter_options = v;
        }
        if let Some(v) = self.blacklist {
            class.blacklist = v;
        }
        if let Some(v) = self.tokenize {
            class.tokenize = v;
        }
        if let Some(v) = self.xss {
            class.xss = v;
        }
    }
}

/// Represents the top-level policy.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct Policy {
    /// Ordered field rules. The wildcard rule is always evaluated last.
    pub fields: Vec<FieldRule>,
    pub classes: BTreeMap<String, SanitizationClass>,
    /// XSS signatures; the built-in set when omitted.
    pub xss_patterns: Vec<String>,
    /// Named tokenize patterns, referenced from `SanitizationClass::tokenize`.
    pub tokenizations: BTreeMap<String, String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            classes: BTreeMap::new(),
            xss_patterns: DEFAULT_XSS_PATTERNS.iter().map(|p| p.to_string()).collect(),
            tokenizations: BTreeMap::new(),
        }
    }
}

/// A partial policy merged over the active one. Override wins.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyOverride {
    /// Rules replacing the class of a base rule with the same pattern, or appended.
    pub fields: Vec<FieldRule>,
    pub classes: BTreeMap<String, ClassOverride>,
    /// Replaces the signature list wholesale when set.
    pub xss_patterns: Option<Vec<String>>,
    pub tokenizations: BTreeMap<String, String>,
}

impl PolicyOverride {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.classes.is_empty()
            && self.xss_patterns.is_none()
            && self.tokenizations.is_empty()
    }

    /// Loads an override from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading policy override from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy override {}", path.display()))?;
        serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse policy override {}", path.display()))
    }
}

impl Policy {
    /// Loads a policy from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading policy from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        let policy: Policy = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse policy file {}", path.display()))?;

        policy
            .validate()
            .with_context(|| format!("Invalid policy in {}", path.display()))?;
        info!(
            "Loaded {} field rules and {} classes from {}.",
            policy.fields.len(),
            policy.classes.len(),
            path.display()
        );
        Ok(policy)
    }

    /// Loads the built-in policy from the embedded configuration.
    ///
    /// `*.email` fields get the `email` class, `*.url` fields the `url` class
    /// and everything else the `string` class.
    pub fn load_default() -> Result<Self> {
        debug!("Loading default policy from embedded string...");
        let default_yaml = include_str!("../config/default_policy.yaml");
        let policy: Policy =
            serde_yml::from_str(default_yaml).context("Failed to parse default policy")?;

        debug!(
            "Loaded default policy: {} field rules, {} classes.",
            policy.fields.len(),
            policy.classes.len()
        );
        Ok(policy)
    }

    pub fn class(&self, name: &str) -> Option<&SanitizationClass> {
        self.classes.get(name)
    }

    /// Checks class references, tokenize references and pattern lengths.
    ///
    /// Regexes that fail to compile are only warned about: at clean time they
    /// never match, so the rule degrades to pass-through.
    pub fn validate(&self) -> Result<(), InputCleanError> {
        let mut errors = Vec::new();

        for rule in &self.fields {
            if !self.classes.contains_key(&rule.class) {
                errors.push(InputCleanError::UnknownClass(rule.pattern.clone(), rule.class.clone()));
            }
            check_length(&rule.pattern, &mut errors);
        }

        for (name, class) in &self.classes {
            for entry in &class.tokenize {
                if self.tokenizations.contains_key(entry) || builtin_tokenization(entry).is_some() {
                    continue;
                }
                if looks_like_name(entry) {
                    errors.push(InputCleanError::UnknownTokenization(name.clone(), entry.clone()));
                    continue;
                }
                check_length(entry, &mut errors);
                warn_if_invalid(entry, "tokenize", name);
            }
            for pattern in &class.blacklist {
                check_length(pattern, &mut errors);
                warn_if_invalid(pattern, "blacklist", name);
            }
        }

        for pattern in self.xss_patterns.iter().chain(self.tokenizations.values()) {
            check_length(pattern, &mut errors);
            warn_if_invalid(pattern, "policy", "-");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            n => {
                let message = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n");
                Err(InputCleanError::Fatal(format!("Policy validation failed with {} errors:\n{}", n, message)))
            }
        }
    }
}

/// Merges a runtime override into a base policy.
///
/// Field rules with the same pattern have their class (and kind, if given)
/// replaced in place; new rules are appended. Classes merge flag by flag,
/// tokenizations by name, and a given `xss_patterns` list replaces the base.
pub fn merge_policy(base: Policy, overrides: &PolicyOverride) -> Policy {
    debug!(
        "merge_policy called. Base: {} rules, {} classes. Override: {} rules, {} classes.",
        base.fields.len(),
        base.classes.len(),
        overrides.fields.len(),
        overrides.classes.len()
    );
    let mut merged = base;

    for rule in &overrides.fields {
        match merged.fields.iter_mut().find(|r| r.pattern == rule.pattern) {
            Some(existing) => {
                debug!("Overriding class of rule '{}' with '{}'.", rule.pattern, rule.class);
                existing.class = rule.class.clone();
                if rule.kind.is_some() {
                    existing.kind = rule.kind;
                }
            }
            None => merged.fields.push(rule.clone()),
        }
    }

    for (name, class_override) in &overrides.classes {
        let class = merged.classes.entry(name.clone()).or_default();
        class_override.clone().apply_to(class);
    }

    if let Some(patterns) = &overrides.xss_patterns {
        merged.xss_patterns = patterns.clone();
    }

    for (name, pattern) in &overrides.tokenizations {
        merged.tokenizations.insert(name.clone(), pattern.clone());
    }

    merged
}

fn check_length(pattern: &str, errors: &mut Vec<InputCleanError>) {
    if pattern.len() > MAX_PATTERN_LENGTH {
        errors.push(InputCleanError::PatternLengthExceeded(
            pattern.chars().take(32).collect(),
            pattern.len(),
            MAX_PATTERN_LENGTH,
        ));
    }
}

fn warn_if_invalid(pattern: &str, usage: &str, class: &str) {
    if let Err(e) = compile_pattern(pattern) {
        warn!("Class '{}': {} pattern '{}' is invalid and will never match: {}", class, usage, pattern, e);
    }
}

/// A bare identifier is a tokenization name, not a regex.
fn looks_like_name(entry: &str) -> bool {
    split_delimited(entry).is_none()
        && !entry.is_empty()
        && entry.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
