//! matcher.rs - Field path matching against policy rule keys.
//!
//! A rule key is one of four shapes: the catch-all `*`, an exact field path,
//! a shell glob (`*`, `?`, `[...]`) or a regular expression. Policies may name
//! the shape explicitly; when they don't, the key string is classified once,
//! when the policy is compiled, by [`PatternKind::infer`].
//!
//! License: MIT OR APACHE 2.0

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sanitizers::compiler::{build_regex, compile_pattern, split_delimited};

/// How a rule key is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Wildcard,
    Exact,
    Glob,
    Regex,
}

impl PatternKind {
    /// Classifies a key string by its shape.
    ///
    /// `*` is the wildcard, a delimited string such as `/.*\.email$/` or
    /// `#model#i` is a regex, anything containing glob metacharacters is a
    /// glob and the rest are exact paths. A literal field name that happens to
    /// look delimited (`/x/`) is read as a regex; set the kind explicitly to
    /// avoid that.
    pub fn infer(pattern: &str) -> Self {
        if pattern == "*" {
            PatternKind::Wildcard
        } else if split_delimited(pattern).is_some() {
            PatternKind::Regex
        } else if pattern.contains(['*', '?', '[']) {
            PatternKind::Glob
        } else {
            PatternKind::Exact
        }
    }
}

/// A compiled rule key.
#[derive(Debug, Clone)]
pub enum PatternKey {
    Wildcard,
    Exact(String),
    /// `regex` is `None` when the glob could not be translated; it never matches.
    Glob { source: String, regex: Option<Regex> },
    /// `regex` is `None` when the pattern failed to compile; it never matches.
    Regex { source: String, regex: Option<Regex> },
}

impl PatternKey {
    /// Compiles `pattern` as `kind`, or as the inferred kind when `kind` is `None`.
    ///
    /// Compilation problems are logged and produce a key that never matches,
    /// so a single bad rule degrades to pass-through instead of failing the
    /// whole policy.
    pub fn new(pattern: &str, kind: Option<PatternKind>) -> Self {
        let kind = kind.unwrap_or_else(|| PatternKind::infer(pattern));
        match kind {
            PatternKind::Wildcard => PatternKey::Wildcard,
            PatternKind::Exact => PatternKey::Exact(pattern.to_string()),
            PatternKind::Glob => {
                let regex = glob_to_regex(pattern)
                    .map_err(|e| warn!("Glob '{}' could not be compiled and will never match: {}", pattern, e))
                    .ok();
                PatternKey::Glob { source: pattern.to_string(), regex }
            }
            PatternKind::Regex => {
                let regex = compile_pattern(pattern)
                    .map_err(|e| warn!("Regex '{}' could not be compiled and will never match: {}", pattern, e))
                    .ok();
                PatternKey::Regex { source: pattern.to_string(), regex }
            }
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, PatternKey::Wildcard)
    }

    /// The key as written in the policy.
    pub fn source(&self) -> &str {
        match self {
            PatternKey::Wildcard => "*",
            PatternKey::Exact(s) => s,
            PatternKey::Glob { source, .. } | PatternKey::Regex { source, .. } => source,
        }
    }

    pub fn matches(&self, field_path: &str) -> bool {
        if field_path.is_empty() {
            return false;
        }
        match self {
            PatternKey::Wildcard => true,
            PatternKey::Exact(s) => s == field_path,
            PatternKey::Glob { regex, .. } | PatternKey::Regex { regex, .. } => {
                regex.as_ref().is_some_and(|r| r.is_match(field_path))
            }
        }
    }
}

/// Checks a field path against an unclassified key string.
///
/// Tries, in order: the catch-all `*`, a glob match of the whole path, and,
/// when the first and last characters of `pattern` are the same delimiter, a
/// regex match of the delimited body.
pub fn field_match(pattern: &str, field_path: &str) -> bool {
    if pattern.is_empty() || field_path.is_empty() {
        return false;
    }
    if pattern == "*" {
        return true;
    }
    if glob_match(pattern, field_path) {
        return true;
    }
    if let Some(body) = same_delimiter_body(pattern) {
        match build_regex(body, "") {
            Ok(re) => return re.is_match(field_path),
            Err(e) => debug!("Pattern '{}' is not a usable regex: {}", pattern, e),
        }
    }
    false
}

/// Whole-string shell glob match. `*` and `?` cross `.` boundaries.
pub fn glob_match(pattern: &str, field_path: &str) -> bool {
    glob_to_regex(pattern)
        .map(|re| re.is_match(field_path))
        .unwrap_or(false)
}

fn same_delimiter_body(pattern: &str) -> Option<&str> {
    let mut chars = pattern.chars();
    let first = chars.next()?;
    let last = chars.next_back()?;
    if first != last || first.is_alphanumeric() || first.is_whitespace() || first == '\\' {
        return None;
    }
    Some(&pattern[first.len_utf8()..pattern.len() - last.len_utf8()])
}

/// Translates a shell glob into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push_str("(?s)^");
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                // `[]` and `[!]` are not classes; the bracket is literal.
                Some(close) if close > usize::from(matches!(chars.get(i + 1), Some('!' | '^'))) => {
                    let body = &chars[i + 1..i + 1 + close];
                    out.push('[');
                    for (n, &c) in body.iter().enumerate() {
                        match c {
                            '!' | '^' if n == 0 => out.push('^'),
                            '\\' | '[' | '&' | '~' => {
                                out.push('\\');
                                out.push(c);
                            }
                            _ => out.push(c),
                        }
                    }
                    out.push(']');
                    i += close + 1;
                }
                _ => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out)
}
