//! tokenizer.rs - Temporary protection of substrings from destructive filters.
//!
//! Some legitimate substrings look like markup (`<user@example.com>`) and would
//! be destroyed by tag stripping. Before filtering, every match of a class's
//! tokenize patterns is swapped for an opaque alphanumeric token; after the
//! blacklist stage the tokens are swapped back.
//!
//! A `TokenMap` belongs to exactly one value being cleaned. It is created
//! empty, filled by `tokenize` and drained by `detokenize`.
//!
//! License: MIT OR APACHE 2.0

use log::debug;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Prefix of every generated token.
pub const TOKEN_PREFIX: &str = "TKN";

/// An e-mail address wrapped in angle brackets: no whitespace, one `@`,
/// at least one dot in the domain.
pub const EMAIL_IN_ARROWS: &str = r"/<[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)+>/";

/// Looks up a tokenize pattern shipped with the library.
pub fn builtin_tokenization(name: &str) -> Option<&'static str> {
    match name {
        "emailInArrows" => Some(EMAIL_IN_ARROWS),
        _ => None,
    }
}

/// Stable token for a protected substring.
pub fn token_for(substring: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(substring.as_bytes());
    format!("{}{}", TOKEN_PREFIX, hex::encode(hasher.finalize()))
}

/// Token → original substring, scoped to one clean of one value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenMap {
    tokens: BTreeMap<String, String>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every match of `patterns` in `value` with its token.
    ///
    /// Patterns run in order; a later pattern sees the output of earlier ones,
    /// so it cannot re-match inside an already protected substring.
    pub fn tokenize(&mut self, value: &str, patterns: &[Regex]) -> String {
        let mut out = value.to_string();
        for pattern in patterns {
            let found: Vec<String> = pattern
                .find_iter(&out)
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            for original in found {
                let token = token_for(&original);
                if self.tokens.contains_key(&token) {
                    continue;
                }
                out = out.replace(&original, &token);
                self.tokens.insert(token, original);
            }
        }
        if !self.tokens.is_empty() {
            debug!("Tokenized {} protected substring(s).", self.tokens.len());
        }
        out
    }

    /// Restores every token in `value` and clears the map.
    pub fn detokenize(&mut self, value: &str) -> String {
        if self.tokens.is_empty() {
            return value.to_string();
        }
        let mut out = value.to_string();
        for (token, original) in &self.tokens {
            out = out.replace(token.as_str(), original);
        }
        self.reset();
        out
    }

    /// Forgets all tokens.
    pub fn reset(&mut self) {
        self.tokens.clear();
    }

    /// Registers a token by hand.
    pub fn insert(&mut self, token: impl Into<String>, original: impl Into<String>) {
        self.tokens.insert(token.into(), original.into());
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tokens.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
