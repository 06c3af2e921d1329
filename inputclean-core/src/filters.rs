//! filters.rs - The per-value sanitization pipeline.
//!
//! Every string leaf is run through the same fixed sequence of stages, each
//! switched on or off by its `CompiledClass`:
//!
//! 1. tokenize protected substrings
//! 2. strip markup tags
//! 3. strip script-like blocks and comments
//! 4. character filter and its options
//! 5. blacklist removal
//! 6. restore protected substrings
//! 7. XSS detection
//!
//! License: MIT OR APACHE 2.0

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{CharacterFilter, FilterOptions};
use crate::errors::UnsafeInputError;
use crate::sanitizers::compiler::{CompiledClass, TagStripping};
use crate::tokenizer::TokenMap;
use crate::xss::{is_dangerous, XssSignatureSet};

/// Elements removed together with everything between their open and close tags.
const BLOCK_ELEMENTS: &[&str] = &["script", "style", "iframe", "object", "embed", "applet", "frameset"];

static SCRIPT_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    BLOCK_ELEMENTS
        .iter()
        .map(|name| Regex::new(&format!(r"(?is)<{0}\b[^>]*>.*?</{0}\s*>", name)).expect("static regex"))
        .collect()
});

static VOID_SCRIPT_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:link|meta|base|embed)\b[^>]*>").expect("static regex"));

static STRAY_SCRIPT_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)</?(?:{})\b[^>]*>", BLOCK_ELEMENTS.join("|"))).expect("static regex")
});

static HTML_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));

const EMAIL_EXTRA_CHARS: &str = "!#$%&'*+-/=?^_`{|}~@.[]";
const URL_EXTRA_CHARS: &str = "$-_.+!*'(),{}|\\^~[]`<>#%\";/?:@&=";

/// Runs `value` through every stage `class` enables.
///
/// Empty values pass through untouched. On detection the error carries the
/// fingerprint of the cleaned value; the caller attaches the field path.
pub fn apply(
    value: &str,
    class: &CompiledClass,
    signatures: &XssSignatureSet,
) -> Result<String, UnsafeInputError> {
    if value.is_empty() {
        return Ok(String::new());
    }

    let mut tokens = TokenMap::new();
    let mut out = if class.tokenize.is_empty() {
        value.to_string()
    } else {
        tokens.tokenize(value, &class.tokenize)
    };

    out = strip_tags(&out, &class.strip_tags);
    if class.strip_scripts {
        out = strip_scripts(&out);
    }
    out = filter_characters(&out, class.filter, &class.filter_options, &class.strip_tags);
    out = apply_blacklist(&out, &class.blacklist);
    out = tokens.detokenize(&out);

    if class.xss && is_dangerous(&out, signatures) {
        debug!("Class '{}' rejected a value.", class.name);
        return Err(UnsafeInputError::new(&out));
    }
    Ok(out)
}

/// Removes markup tags, keeping those `stripping` allows.
///
/// A `<` always opens a tag. Inside a tag quotes are honoured and nested `<`
/// raise the depth, so the tag ends at the `>` that brings the depth back to
/// zero. A tag or comment that is never closed swallows the rest of the input.
/// `<!-- ... -->` comments are removed whole; text `>` is kept.
pub fn strip_tags(value: &str, stripping: &TagStripping) -> String {
    if matches!(stripping, TagStripping::Off) || !value.contains('<') {
        return value.to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '<' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        if chars[i..].starts_with(&['<', '!', '-', '-']) {
            i = find_comment_end(&chars, i + 4).unwrap_or(chars.len());
            continue;
        }

        let Some(end) = find_tag_end(&chars, i + 1) else {
            break;
        };
        if let TagStripping::Except(allowed) = stripping {
            let tag: String = chars[i..=end].iter().collect();
            if tag_name(&tag).is_some_and(|name| allowed.contains(&name)) {
                out.push_str(&tag);
            }
        }
        i = end + 1;
    }
    out
}

/// Index just past the `-->` that closes a comment opened before `from`.
fn find_comment_end(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len().saturating_sub(2))
        .find(|&j| chars[j] == '-' && chars[j + 1] == '-' && chars[j + 2] == '>')
        .map(|j| j + 3)
}

/// Index of the `>` closing a tag whose body starts at `from`.
fn find_tag_end(chars: &[char], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    for (j, &c) in chars.iter().enumerate().skip(from) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Lowercase element name of `<name ...>` or `</name>`.
fn tag_name(tag: &str) -> Option<String> {
    let name: String = tag
        .trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

/// Removes script-like blocks with their content, related void and stray
/// tags, and complete HTML comments. Other markup is left alone.
pub fn strip_scripts(value: &str) -> String {
    if !value.contains('<') {
        return value.to_string();
    }
    let mut out = HTML_COMMENTS.replace_all(value, "").into_owned();
    for block in SCRIPT_BLOCKS.iter() {
        out = block.replace_all(&out, "").into_owned();
    }
    out = VOID_SCRIPT_TAGS.replace_all(&out, "").into_owned();
    STRAY_SCRIPT_TAGS.replace_all(&out, "").into_owned()
}

/// Applies a character filter and then its options.
///
/// `String` re-strips tags on its own, honouring an allow-list if the class
/// has one. `None` ignores the options.
pub fn filter_characters(
    value: &str,
    filter: CharacterFilter,
    options: &FilterOptions,
    stripping: &TagStripping,
) -> String {
    let filtered = match filter {
        CharacterFilter::None => return value.to_string(),
        CharacterFilter::Email => keep_ascii(value, EMAIL_EXTRA_CHARS),
        CharacterFilter::Url => keep_ascii(value, URL_EXTRA_CHARS),
        CharacterFilter::String => match stripping {
            TagStripping::Except(_) => strip_tags(value, stripping),
            _ => strip_tags(value, &TagStripping::All),
        },
        CharacterFilter::RawHtml => value.to_string(),
    };
    apply_options(&filtered, options)
}

fn keep_ascii(value: &str, extra: &str) -> String {
    value
        .chars()
        .filter(|&c| c.is_ascii_alphanumeric() || extra.contains(c))
        .collect()
}

fn apply_options(value: &str, options: &FilterOptions) -> String {
    if *options == FilterOptions::default() {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        let code = c as u32;
        let low = code < 0x20;
        let high = code > 0x7F;
        if (low && options.strip_low) || (high && options.strip_high) {
            continue;
        }
        let encode = (low && options.encode_low)
            || (high && options.encode_high)
            || (c == '&' && options.encode_amp)
            || ((c == '"' || c == '\'') && options.encode_quotes);
        if encode {
            out.push_str(&format!("&#{};", code));
        } else {
            out.push(c);
        }
    }
    out
}

/// Removes every match of each pattern, in order.
pub fn apply_blacklist(value: &str, blacklist: &[Regex]) -> String {
    let mut out = value.to_string();
    for pattern in blacklist {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, "").into_owned();
        }
    }
    out
}
