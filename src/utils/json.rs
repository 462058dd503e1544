//! Tolerant extraction of a JSON object from free-form service answers.
//!
//! Answers often come wrapped in a code fence, surrounded by prose, or with
//! raw newlines inside string literals. [`parse_embedded`] copes with all three.

use serde::de::DeserializeOwned;

/// Remove code fence marker lines, e.g. ```` ```json ```` and the closing ```` ``` ````.
pub fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First balanced `{...}` span. Braces inside string literals are ignored.
pub fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Escape raw control characters that appear inside string literals.
pub fn escape_controls_in_strings(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in json.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '"' => in_string = false,
                '\n' => {
                    out.push_str("\\n");
                    continue;
                }
                '\r' => {
                    out.push_str("\\r");
                    continue;
                }
                '\t' => {
                    out.push_str("\\t");
                    continue;
                }
                c if c.is_control() => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                    continue;
                }
                _ => {}
            }
        } else if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }
    out
}

/// Parse the first JSON object embedded in `text`.
pub fn parse_embedded<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let unfenced = strip_fences(text);
    let candidate = first_object(&unfenced).unwrap_or(unfenced.as_str());
    serde_json::from_str(candidate)
        .or_else(|_| serde_json::from_str(&escape_controls_in_strings(candidate)))
}
