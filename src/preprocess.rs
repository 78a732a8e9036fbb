//! Source rewrites applied before tokenization.
//!
//! Fenced code is passed through untouched; every other stretch of lines
//! goes through bold normalization, bullet normalization and color-span
//! substitution, in that order.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::fence::{FenceTracker, LineClass};

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("bold pattern"));

static COLOR_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{color:(#[0-9a-fA-F]{3,8})\}([\s\S]*?)\{/color\}").expect("color span pattern")
});

pub fn preprocess(src: &str) -> String {
    let mut out = String::with_capacity(src.len() + 64);
    for chunk in split_fenced(src) {
        match chunk {
            Chunk::Code(code) => out.push_str(code),
            Chunk::Text(text) => {
                let text = normalize_bold(text);
                let text = normalize_bullets(&text);
                out.push_str(&substitute_color_spans(&text));
            }
        }
    }
    out
}

#[derive(Debug, PartialEq)]
enum Chunk<'a> {
    Text(&'a str),
    Code(&'a str),
}

/// Splits `src` into runs of ordinary lines and fenced code (fence lines included).
fn split_fenced(src: &str) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut tracker = FenceTracker::new();
    let mut start = 0;
    let mut in_code = false;
    let mut offset = 0;

    for line in src.split_inclusive('\n') {
        let code_line = !matches!(
            tracker.advance(line.trim_end_matches(['\n', '\r'])),
            LineClass::Text
        );
        if code_line != in_code && offset > start {
            let piece = &src[start..offset];
            chunks.push(if in_code { Chunk::Code(piece) } else { Chunk::Text(piece) });
            start = offset;
        }
        in_code = code_line;
        offset += line.len();
    }
    if offset > start {
        let piece = &src[start..offset];
        chunks.push(if in_code { Chunk::Code(piece) } else { Chunk::Text(piece) });
    }
    chunks
}

/// Rewrites `**text**` to `<strong>text</strong>`.
///
/// Code spans, HTML tags and backslash escapes are left alone, so attribute
/// values and already-formed tags are never wrapped a second time.
pub fn normalize_bold(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut cursor = 0;
    for span in protected_spans(text) {
        out.push_str(&BOLD.replace_all(&text[cursor..span.start], "<strong>$1</strong>"));
        out.push_str(&text[span.clone()]);
        cursor = span.end;
    }
    out.push_str(&BOLD.replace_all(&text[cursor..], "<strong>$1</strong>"));
    out
}

fn protected_spans(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                let len = text[i + 1..].chars().next().map_or(1, char::len_utf8);
                spans.push(i..i + 1 + len);
                i += 1 + len;
            }
            b'`' => {
                let run = bytes[i..].iter().take_while(|b| **b == b'`').count();
                match find_backtick_run(bytes, i + run, run) {
                    Some(end) => {
                        spans.push(i..end);
                        i = end;
                    }
                    None => i += run,
                }
            }
            b'<' if bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'/' || *b == b'!') =>
            {
                match text[i..].find('>') {
                    Some(rel) => {
                        spans.push(i..i + rel + 1);
                        i += rel + 1;
                    }
                    None => i += 1,
                }
            }
            _ => i += 1,
        }
    }
    spans
}

/// Finds the end of a closing backtick run of exactly `len` starting at or after `from`.
pub(crate) fn find_backtick_run(bytes: &[u8], from: usize, len: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let run = bytes[i..].iter().take_while(|b| **b == b'`').count();
            if run == len {
                return Some(i + run);
            }
            i += run;
        } else {
            i += 1;
        }
    }
    None
}

/// Turns `- item` lines into `• item` text, keeping indentation.
///
/// Task list lines (`- [ ]`, `- [x]`) keep their list syntax so the
/// checkbox still renders.
pub fn normalize_bullets(text: &str) -> String {
    text.split_inclusive('\n').map(normalize_bullet_line).collect()
}

fn normalize_bullet_line(line: &str) -> Cow<'_, str> {
    let body = line.trim_start_matches([' ', '\t']);
    let indent = &line[..line.len() - body.len()];
    let Some(after_dash) = body.strip_prefix('-') else {
        return Cow::Borrowed(line);
    };
    let content = after_dash.trim_start_matches([' ', '\t']);
    if content.len() == after_dash.len() || content.trim().is_empty() || is_task_marker(content) {
        return Cow::Borrowed(line);
    }
    Cow::Owned(format!("{}• {}", indent, content))
}

fn is_task_marker(content: &str) -> bool {
    let marker = content.get(..3);
    matches!(marker, Some("[ ]" | "[x]" | "[X]"))
        && content[3..].chars().next().is_none_or(char::is_whitespace)
}

/// Rewrites `{color:#hex}text{/color}` into a span with a forced color.
pub fn substitute_color_spans(text: &str) -> Cow<'_, str> {
    COLOR_SPAN.replace_all(text, r#"<span style="color: $1 !important">$2</span>"#)
}
