//! compiler.rs - Manages the compilation and caching of sanitization policies.
//!
//! This module turns a `Policy` into a `CompiledPolicy`: field keys become
//! `PatternKey`s ordered for evaluation, every class gets its regexes built
//! and its tokenize references resolved, and the XSS signatures are compiled
//! once. Compiled policies are immutable and shared through a global cache
//! keyed by a hash of the policy.
//!
//! License: MIT OR APACHE 2.0

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{CharacterFilter, FilterOptions, Policy, SanitizationClass, TagPolicy};
use crate::errors::InputCleanError;
use crate::matcher::PatternKey;
use crate::tokenizer::builtin_tokenization;
use crate::xss::XssSignatureSet;

/// Upper bound on the compiled size of any single policy regex.
const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Flags accepted after the closing delimiter of a delimited pattern.
const PATTERN_FLAGS: &str = "imsxuU";

/// Splits a delimited pattern such as `/body/flags` into body and flags.
///
/// The delimiter is any ASCII punctuation character other than a backslash,
/// a bracket or a glob metacharacter. Returns `None` for bare patterns.
pub fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let delimiter = pattern.chars().next()?;
    if !delimiter.is_ascii_punctuation() || "\\([{<*?".contains(delimiter) {
        return None;
    }
    let close = pattern.rfind(delimiter)?;
    if close == 0 {
        return None;
    }
    let flags = &pattern[close + 1..];
    if !flags.chars().all(|c| PATTERN_FLAGS.contains(c)) {
        return None;
    }
    Some((&pattern[1..close], flags))
}

/// Builds a regex from a body and delimiter-style flags.
pub fn build_regex(body: &str, flags: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(body)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .swap_greed(flags.contains('U'))
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

/// Compiles a policy pattern written either delimited (`#body#iU`) or bare.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    match split_delimited(pattern) {
        Some((body, flags)) => build_regex(body, flags),
        None => build_regex(pattern, ""),
    }
}

/// Compiles a list of patterns, dropping (and logging) the ones that fail.
pub fn compile_patterns_lossy<'a, I>(patterns: I, usage: &str) -> Vec<Regex>
where
    I: IntoIterator<Item = &'a String>,
{
    patterns
        .into_iter()
        .filter_map(|p| match compile_pattern(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Skipping {} pattern '{}': {}", usage, p, e);
                None
            }
        })
        .collect()
}

/// How a class treats markup tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagStripping {
    Off,
    All,
    /// Strip every tag except these lowercase names.
    Except(HashSet<String>),
}

impl From<&TagPolicy> for TagStripping {
    fn from(policy: &TagPolicy) -> Self {
        match policy {
            TagPolicy::Toggle(false) => TagStripping::Off,
            TagPolicy::Toggle(true) => TagStripping::All,
            TagPolicy::Allow(tags) => TagStripping::Except(
                tags.iter()
                    .map(|t| t.trim_matches(|c| c == '<' || c == '>' || c == '/').to_ascii_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
        }
    }
}

/// A sanitization class with all patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledClass {
    pub name: String,
    pub strip_tags: TagStripping,
    pub strip_scripts: bool,
    pub filter: CharacterFilter,
    pub filter_options: FilterOptions,
    pub blacklist: Vec<Regex>,
    pub tokenize: Vec<Regex>,
    pub xss: bool,
}

impl CompiledClass {
    /// Compiles a class, resolving named tokenize entries against `tokenizations`
    /// and then the built-in table.
    pub fn compile(
        name: &str,
        class: &SanitizationClass,
        tokenizations: &BTreeMap<String, String>,
    ) -> Self {
        let tokenize_sources: Vec<String> = class
            .tokenize
            .iter()
            .map(|entry| {
                tokenizations
                    .get(entry)
                    .cloned()
                    .or_else(|| builtin_tokenization(entry).map(str::to_string))
                    .unwrap_or_else(|| entry.clone())
            })
            .collect();

        Self {
            name: name.to_string(),
            strip_tags: TagStripping::from(&class.strip_tags),
            strip_scripts: class.strip_scripts,
            filter: class.filter,
            filter_options: class.filter_options,
            blacklist: compile_patterns_lossy(&class.blacklist, "blacklist"),
            tokenize: compile_patterns_lossy(&tokenize_sources, "tokenize"),
            xss: class.xss,
        }
    }
}

/// A field rule with its key compiled.
#[derive(Debug, Clone)]
pub struct CompiledFieldRule {
    pub key: PatternKey,
    pub class: String,
}

/// Represents a fully compiled policy, ready for cleaning.
#[derive(Debug)]
pub struct CompiledPolicy {
    /// Field rules in evaluation order: declared order, wildcard rules last.
    pub rules: Vec<CompiledFieldRule>,
    pub classes: HashMap<String, CompiledClass>,
    pub signatures: XssSignatureSet,
}

impl CompiledPolicy {
    pub fn class(&self, name: &str) -> Option<&CompiledClass> {
        self.classes.get(name)
    }
}

/// A cached compilation together with the policy it was built from.
struct CacheEntry {
    source: Policy,
    compiled: Arc<CompiledPolicy>,
}

lazy_static! {
    /// A thread-safe, global cache for compiled policies.
    /// The key is a hash of the `Policy`; entries are only served when the
    /// stored source policy is equal to the requested one.
    static ref COMPILED_POLICY_CACHE: RwLock<HashMap<u64, CacheEntry>> = RwLock::new(HashMap::new());
}

/// Hashes the `Policy` to create a stable key for the cache.
fn hash_policy(policy: &Policy) -> u64 {
    let mut hasher = DefaultHasher::new();
    policy.hash(&mut hasher);
    hasher.finish()
}

/// Validates and compiles a `Policy`. This is the low-level function that
/// performs the actual regex compilation.
pub fn compile_policy(policy: &Policy) -> Result<CompiledPolicy, InputCleanError> {
    debug!(
        "Starting compilation of policy: {} field rules, {} classes.",
        policy.fields.len(),
        policy.classes.len()
    );
    policy.validate()?;

    let (wildcards, ordered): (Vec<_>, Vec<_>) = policy
        .fields
        .iter()
        .map(|rule| CompiledFieldRule {
            key: PatternKey::new(&rule.pattern, rule.kind),
            class: rule.class.clone(),
        })
        .partition(|rule| rule.key.is_wildcard());
    let rules: Vec<CompiledFieldRule> = ordered.into_iter().chain(wildcards).collect();

    let classes = policy
        .classes
        .iter()
        .map(|(name, class)| (name.clone(), CompiledClass::compile(name, class, &policy.tokenizations)))
        .collect();

    let signatures = XssSignatureSet::from_patterns(&policy.xss_patterns);

    debug!(
        "Finished compiling policy: {} rules, {} signatures.",
        rules.len(),
        signatures.len()
    );
    Ok(CompiledPolicy { rules, classes, signatures })
}

/// Gets a `CompiledPolicy` from the cache or compiles it if not found.
///
/// This is the entry point for long-lived policies (engine construction and
/// `set_policy`). It returns an `Arc`, allowing for cheap sharing across
/// threads. Short-lived policies such as per-call overrides should go through
/// `compile_policy` so they do not accumulate in the cache.
pub fn get_or_compile_policy(policy: &Policy) -> Result<Arc<CompiledPolicy>, InputCleanError> {
    let cache_key = hash_policy(policy);

    {
        let cache = COMPILED_POLICY_CACHE.read().unwrap_or_else(PoisonError::into_inner);
        match cache.get(&cache_key) {
            Some(entry) if entry.source == *policy => {
                debug!("Serving compiled policy from cache for key: {}", cache_key);
                return Ok(Arc::clone(&entry.compiled));
            }
            Some(_) => warn!("Policy cache key {} collides with a different policy; recompiling.", cache_key),
            None => {}
        }
    }

    debug!("Compiled policy not found in cache. Compiling now.");
    let compiled = Arc::new(compile_policy(policy)?);

    COMPILED_POLICY_CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(
            cache_key,
            CacheEntry {
                source: policy.clone(),
                compiled: Arc::clone(&compiled),
            },
        );

    debug!("Successfully compiled and cached policy for key: {}", cache_key);
    Ok(compiled)
}

/// Whether `policy` currently has an entry in the global cache.
#[cfg(test)]
pub(crate) fn is_cached(policy: &Policy) -> bool {
    COMPILED_POLICY_CACHE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&hash_policy(policy))
        .is_some_and(|entry| entry.source == *policy)
}
