use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::docx::tree::{XmlElement, XmlNode};

/// `{tag}` placeholder: anything but braces between one `{` and the next `}`.
pub static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("tag"));

/// Collects distinct raw tags in document order across the given part roots.
///
/// Each paragraph is matched on its own, so a placeholder split across two
/// paragraphs is never seen. Raw tags are trimmed and compared case-sensitively.
pub fn scan_tags<'a>(roots: impl IntoIterator<Item = &'a XmlElement>) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for root in roots {
        root.visit(&mut |e| {
            if e.name != "w:p" {
                return;
            }
            let text = paragraph_text(e);
            for raw in tags_in_text(&text) {
                if seen.insert(raw.to_string()) {
                    ordered.push(raw.to_string());
                }
            }
        });
    }
    ordered
}

/// Trimmed, non-empty placeholder texts in `text`, in match order.
pub fn tags_in_text(text: &str) -> impl Iterator<Item = &str> {
    TAG_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Text of all `w:t` nodes under a paragraph, excluding nested paragraphs.
pub fn paragraph_text(paragraph: &XmlElement) -> String {
    let mut out = String::new();
    collect_wt(paragraph, &mut out);
    out
}

fn collect_wt(elem: &XmlElement, out: &mut String) {
    for c in &elem.children {
        let XmlNode::Element(child) = c else {
            continue;
        };
        match child.name.as_str() {
            "w:t" => out.push_str(&child.own_text()),
            "w:p" => {}
            _ => collect_wt(child, out),
        }
    }
}
