//! Fenced code block tracking, shared by the preprocessor and the lexer.
//!
//! Only the opening/closing rules matter here: 0-3 columns of indent,
//! three or more backticks or tildes, and a closer of the same marker that
//! is at least as long as the opener and carries no info string.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    pub marker: char,
    pub length: usize,
    pub indent: usize,
    pub info: String,
}

/// How a line relates to fenced code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Text,
    Open(Fence),
    Inside,
    Close,
}

#[derive(Debug, Default, Clone)]
pub struct FenceTracker {
    open: Option<Fence>,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// Classifies one line (without its trailing newline) and advances.
    pub fn advance(&mut self, line: &str) -> LineClass {
        match &self.open {
            Some(fence) => {
                if closes(line, fence) {
                    self.open = None;
                    LineClass::Close
                } else {
                    LineClass::Inside
                }
            }
            None => match opening_fence(line) {
                Some(fence) => {
                    self.open = Some(fence.clone());
                    LineClass::Open(fence)
                }
                None => LineClass::Text,
            },
        }
    }
}

/// Returns (visual columns, byte offset) of leading whitespace. Tabs stop every 4 columns.
pub fn leading_indent(line: &str) -> (usize, usize) {
    let mut col = 0;
    let mut bytes = 0;
    for b in line.bytes() {
        match b {
            b' ' => col += 1,
            b'\t' => col += 4 - (col % 4),
            _ => break,
        }
        bytes += 1;
    }
    (col, bytes)
}

pub fn opening_fence(line: &str) -> Option<Fence> {
    let (indent, offset) = leading_indent(line);
    if indent > 3 {
        return None;
    }
    let rest = &line[offset..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let length = rest.chars().take_while(|c| *c == marker).count();
    if length < 3 {
        return None;
    }
    let info = rest[length..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some(Fence {
        marker,
        length,
        indent,
        info: info.to_string(),
    })
}

fn closes(line: &str, fence: &Fence) -> bool {
    let (indent, offset) = leading_indent(line);
    if indent > 3 {
        return false;
    }
    let rest = &line[offset..];
    let length = rest.chars().take_while(|c| *c == fence.marker).count();
    length >= fence.length && rest[length..].trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(src: &str) -> Vec<LineClass> {
        let mut tracker = FenceTracker::new();
        src.lines().map(|l| tracker.advance(l)).collect()
    }

    #[test]
    fn tracks_open_inside_close() {
        let classes = classify("a\n```rust\nlet x = 1;\n```\nb");
        assert_eq!(classes[0], LineClass::Text);
        assert!(matches!(&classes[1], LineClass::Open(f) if f.info == "rust"));
        assert_eq!(classes[2], LineClass::Inside);
        assert_eq!(classes[3], LineClass::Close);
        assert_eq!(classes[4], LineClass::Text);
    }

    #[test]
    fn shorter_or_different_closer_does_not_close() {
        let classes = classify("````\n```\n~~~~\n````");
        assert_eq!(classes[1], LineClass::Inside);
        assert_eq!(classes[2], LineClass::Inside);
        assert_eq!(classes[3], LineClass::Close);
    }

    #[test]
    fn four_space_indent_is_not_a_fence() {
        assert!(opening_fence("    ```").is_none());
        assert!(opening_fence("\t```").is_none());
        assert!(opening_fence("   ~~~ text").is_some());
    }

    #[test]
    fn closer_with_info_string_stays_inside() {
        let classes = classify("```\n``` rust\n```");
        assert_eq!(classes[1], LineClass::Inside);
        assert_eq!(classes[2], LineClass::Close);
    }
}
