//! Lossless single-pass segmentation of a markdown document.
//!
//! The scanner recognizes only what the rewriter cares about: fenced code
//! blocks, `![alt](url)` images, `<img src="...">` tags and `[text](url)`
//! links. Everything else, inline code spans included, is prose. Joining
//! the `raw` text of all segments gives back the input byte for byte.

use std::ops::Range;

/// Span of a document whose target URL may be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub raw: &'a str,
    /// Byte range of the target inside `raw`, title excluded.
    pub url_range: Range<usize>,
}

impl<'a> Reference<'a> {
    pub fn url(&self) -> &'a str {
        &self.raw[self.url_range.clone()]
    }

    /// `raw` with the target swapped for `url`.
    pub fn with_url(&self, url: &str) -> String {
        let mut out = String::with_capacity(self.raw.len() + url.len());
        out.push_str(&self.raw[..self.url_range.start]);
        out.push_str(url);
        out.push_str(&self.raw[self.url_range.end..]);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Prose(&'a str),
    /// `![alt](url)`
    Image(Reference<'a>),
    /// `<img ... src="url" ...>`
    HtmlImage(Reference<'a>),
    /// `[text](url)`; `text` may itself hold images.
    Link {
        reference: Reference<'a>,
        text: &'a str,
    },
    /// Fence lines included; runs to the end when unclosed.
    CodeBlock(&'a str),
}

impl<'a> Segment<'a> {
    pub fn raw(&self) -> &'a str {
        match self {
            Self::Prose(raw) | Self::CodeBlock(raw) => raw,
            Self::Image(reference) | Self::HtmlImage(reference) => reference.raw,
            Self::Link { reference, .. } => reference.raw,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Self::CodeBlock(_))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_) | Self::HtmlImage(_))
    }
}

/// Split `doc` into segments in document order.
pub fn segment(doc: &str) -> Vec<Segment<'_>> {
    let bytes = doc.as_bytes();
    let mut segments = Vec::new();
    let mut prose_start = 0;
    let mut i = 0;

    fn flush<'a>(segments: &mut Vec<Segment<'a>>, doc: &'a str, from: usize, to: usize) {
        if from < to {
            segments.push(Segment::Prose(&doc[from..to]));
        }
    }

    while i < bytes.len() {
        if (i == 0 || bytes[i - 1] == b'\n') && fence_at(bytes, i) {
            let end = fence_end(bytes, i);
            flush(&mut segments, doc, prose_start, i);
            segments.push(Segment::CodeBlock(&doc[i..end]));
            i = end;
            prose_start = end;
            continue;
        }

        match bytes[i] {
            b'\\' => i = (i + 2).min(bytes.len()),
            b'`' => i = skip_code_span(bytes, i),
            b'!' if bytes.get(i + 1) == Some(&b'[') => match inline_target(bytes, i + 1) {
                Some((_, url_range, end)) => {
                    flush(&mut segments, doc, prose_start, i);
                    segments.push(Segment::Image(Reference {
                        raw: &doc[i..end],
                        url_range: url_range.start - i..url_range.end - i,
                    }));
                    i = end;
                    prose_start = end;
                }
                None => i += 1,
            },
            b'[' => match inline_target(bytes, i) {
                Some((text_end, url_range, end)) => {
                    flush(&mut segments, doc, prose_start, i);
                    segments.push(Segment::Link {
                        reference: Reference {
                            raw: &doc[i..end],
                            url_range: url_range.start - i..url_range.end - i,
                        },
                        text: &doc[i + 1..text_end],
                    });
                    i = end;
                    prose_start = end;
                }
                None => i += 1,
            },
            b'<' => match html_image(doc, i) {
                Some((url_range, end)) => {
                    flush(&mut segments, doc, prose_start, i);
                    segments.push(Segment::HtmlImage(Reference {
                        raw: &doc[i..end],
                        url_range: url_range.start - i..url_range.end - i,
                    }));
                    i = end;
                    prose_start = end;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    flush(&mut segments, doc, prose_start, bytes.len());
    segments
}

// ============================================================================
// Fenced Code Blocks
// ============================================================================

/// A fence opens with three backticks after at most three spaces.
fn fence_at(bytes: &[u8], line_start: usize) -> bool {
    let indent = bytes[line_start..]
        .iter()
        .take(4)
        .take_while(|&&b| b == b' ')
        .count();
    indent <= 3 && bytes[line_start + indent..].starts_with(b"```")
}

/// End (exclusive) of the block opened at `start`, closing line included.
fn fence_end(bytes: &[u8], start: usize) -> usize {
    let mut line = next_line(bytes, start);
    while line < bytes.len() {
        let after = next_line(bytes, line);
        if fence_at(bytes, line) {
            return after;
        }
        line = after;
    }
    bytes.len()
}

fn next_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| from + p + 1)
}

// ============================================================================
// Inline Code
// ============================================================================

/// Index after the code span opening at `start`, or after the backtick run
/// when it never closes.
fn skip_code_span(bytes: &[u8], start: usize) -> usize {
    let run = bytes[start..].iter().take_while(|&&b| b == b'`').count();
    let mut i = start + run;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let closing = bytes[i..].iter().take_while(|&&b| b == b'`').count();
            if closing == run {
                return i + closing;
            }
            i += closing;
        } else {
            i += 1;
        }
    }
    start + run
}

// ============================================================================
// Inline Targets
// ============================================================================

/// Parse `[text](target "title")` starting at the `[`.
///
/// Returns the index of the closing `]`, the target range, and the index
/// after the closing `)`.
fn inline_target(bytes: &[u8], open: usize) -> Option<(usize, Range<usize>, usize)> {
    let close = bracket_end(bytes, open)?;
    if bytes.get(close + 1) != Some(&b'(') {
        return None;
    }
    let (url_range, end) = destination(bytes, close + 2)?;
    Some((close, url_range, end))
}

/// Matching `]` for the `[` at `open`. Gives up at a blank line.
fn bracket_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'\n' if bytes.get(i + 1) == Some(&b'\n') => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parse a link destination plus optional title, starting after `(`.
fn destination(bytes: &[u8], from: usize) -> Option<(Range<usize>, usize)> {
    let mut i = from;
    while matches!(bytes.get(i), Some(b' ' | b'\t')) {
        i += 1;
    }

    let url_range = if bytes.get(i) == Some(&b'<') {
        let start = i + 1;
        let len = bytes[start..]
            .iter()
            .position(|&b| b == b'>' || b == b'\n')?;
        if bytes[start + len] != b'>' {
            return None;
        }
        i = start + len + 1;
        start..start + len
    } else {
        let start = i;
        let mut depth = 0usize;
        while let Some(&b) = bytes.get(i) {
            match b {
                b' ' | b'\t' | b'\n' => break,
                b'(' => depth += 1,
                b')' if depth == 0 => break,
                b')' => depth -= 1,
                b'\\' => i += 1,
                _ => {}
            }
            i += 1;
        }
        start..i.min(bytes.len())
    };

    // Optional title, then the closing paren
    let mut quote: Option<u8> = None;
    while let Some(&b) = bytes.get(i) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'(') => quote = Some(b')'),
            (None, b')') => return Some((url_range, i + 1)),
            (None, b'\n') if bytes.get(i + 1) == Some(&b'\n') => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

// ============================================================================
// HTML Images
// ============================================================================

/// Parse an `<img ...>` tag at `start`; returns the `src` value range and the
/// index after `>`.
///
/// Attributes are walked one by one, so `src=` inside another attribute's
/// quoted value is never taken for the real one.
fn html_image(doc: &str, start: usize) -> Option<(Range<usize>, usize)> {
    let bytes = doc.as_bytes();
    let name = bytes.get(start + 1..start + 4)?;
    if !name.eq_ignore_ascii_case(b"img")
        || !matches!(bytes.get(start + 4), Some(b' ' | b'\t' | b'\r' | b'\n' | b'/'))
    {
        return None;
    }

    let is_space = |b: u8| matches!(b, b' ' | b'\t' | b'\r' | b'\n');
    let skip_spaces = |mut i: usize| {
        while bytes.get(i).is_some_and(|&b| is_space(b)) {
            i += 1;
        }
        i
    };

    let mut src = None;
    let mut i = start + 4;
    loop {
        while bytes.get(i).is_some_and(|&b| is_space(b) || b == b'/') {
            i += 1;
        }
        if *bytes.get(i)? == b'>' {
            break;
        }

        let name_start = i;
        while let Some(&b) = bytes.get(i)
            && !is_space(b)
            && !matches!(b, b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let attr = &bytes[name_start..i];

        let eq = skip_spaces(i);
        if bytes.get(eq) != Some(&b'=') {
            // bare attribute
            continue;
        }
        i = skip_spaces(eq + 1);
        let value = match *bytes.get(i)? {
            q @ (b'"' | b'\'') => {
                let len = bytes[i + 1..].iter().position(|&b| b == q)?;
                let value = i + 1..i + 1 + len;
                i = value.end + 1;
                value
            }
            _ => {
                let from = i;
                while let Some(&b) = bytes.get(i)
                    && !is_space(b)
                    && b != b'>'
                {
                    i += 1;
                }
                from..i
            }
        };
        if src.is_none() && attr.eq_ignore_ascii_case(b"src") {
            src = Some(value);
        }
    }

    let src = src?;
    if doc[src.clone()].trim().is_empty() {
        return None;
    }
    Some((src, i + 1))
}

// ============================================================================
// Tests
// ============================================================================
