//! Inline HTML cleanup inside fenced code blocks.
//!
//! Pages copied out of a browser often carry `<span>` or `<br>` noise inside
//! code. When a block contains tags, a fixed set of them is turned into
//! markdown or dropped. Fence lines are never touched.

use regex::Regex;
use std::sync::LazyLock;

/// Ordered substitutions; longer `<br` forms first.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("<br />", "  \n"),
    ("<br/>", "  \n"),
    ("<br>", "  \n"),
    ("<b>", "**"),
    ("</b>", "**"),
    ("<i>", "*"),
    ("</i>", "*"),
    ("<span>", ""),
    ("</span>", ""),
    ("<code>", ""),
    ("</code>", ""),
    ("&nbsp;", " "),
];

fn has_html_tag(text: &str) -> bool {
    static RE_TAG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*([ \t][^<>\n]*)?/?>").unwrap());
    RE_TAG.is_match(text)
}

/// Split a raw block into opening fence line, body and closing fence line.
fn split_block(raw: &str) -> (&str, &str, &str) {
    let open_end = raw.find('\n').map_or(raw.len(), |p| p + 1);
    let (open, rest) = raw.split_at(open_end);

    // The closing fence is the last line when it starts with backticks
    let trimmed = rest.strip_suffix('\n').unwrap_or(rest);
    let last_start = trimmed.rfind('\n').map_or(0, |p| p + 1);
    if rest.is_empty() || !trimmed[last_start..].trim_start().starts_with("```") {
        return (open, rest, "");
    }
    let (body, close) = rest.split_at(last_start);
    (open, body, close)
}

/// Cleaned block, or `None` when the block carries no HTML.
pub fn clean_fenced(raw: &str) -> Option<String> {
    let (open, body, close) = split_block(raw);
    if !has_html_tag(body) {
        return None;
    }

    let cleaned = SUBSTITUTIONS
        .iter()
        .fold(body.to_owned(), |acc, (from, to)| acc.replace(from, to));
    if cleaned == body {
        return None;
    }
    Some(format!("{open}{cleaned}{close}"))
}
