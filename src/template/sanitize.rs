use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace"));
static INVALID_CHAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{Nd}_\-.\u{00B7}]").expect("invalid name char"));

/// Turns placeholder text into an XML element name.
///
/// The result is never empty, starts with a letter or `_`, and never starts with the
/// reserved `xml` prefix. Applying it to its own output is a no-op. Uniqueness across a
/// set of tags is handled by [`crate::template::datadoc::build_tag_map`].
pub fn sanitize_xml_name(raw: &str) -> String {
    let normalized: String = raw.nfc().collect();
    let trimmed = normalized.trim();

    let name = WHITESPACE_RE.replace_all(trimmed, "_");
    let name = name.replace(':', "_");
    let mut name = INVALID_CHAR_RE.replace_all(&name, "_").into_owned();

    if name.is_empty() {
        name.push('_');
    }
    let starts_ok = name
        .chars()
        .next()
        .map(|c| c == '_' || c.is_alphabetic())
        .unwrap_or(false);
    if !starts_ok {
        name.insert(0, '_');
    }
    if name
        .get(..3)
        .map(|p| p.eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
    {
        name.insert(0, '_');
    }
    name
}

/// True when `name` is already in the form produced by [`sanitize_xml_name`].
pub fn is_valid_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first == '_' || first.is_alphabetic()) {
        return false;
    }
    if INVALID_CHAR_RE.is_match(name) {
        return false;
    }
    !name
        .get(..3)
        .map(|p| p.eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}
