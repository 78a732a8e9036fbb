use super::{Extension, Level, Matched};
use crate::fence::{LineClass, FenceTracker, opening_fence};
use crate::renderer::{Renderer, style_attr};
use crate::style::resolve_style;
use crate::token::{Token, TokenKind};

/// Diagram keywords recognized in an untagged fence.
const DIAGRAM_KEYWORDS: &[&str] = &[
    "pie",
    "graph",
    "sequenceDiagram",
    "gantt",
    "classDiagram",
    "flowchart",
];

/// Fenced diagrams: ```` ```mermaid ```` or an untagged fence opening with a diagram keyword.
pub struct MermaidExtension;

impl Extension for MermaidExtension {
    fn name(&self) -> &'static str {
        "mermaid"
    }

    fn level(&self) -> Level {
        Level::Block
    }

    fn kind(&self) -> TokenKind {
        TokenKind::MermaidBlock
    }

    fn start(&self, src: &str) -> bool {
        src.starts_with("```") || src.starts_with("~~~")
    }

    fn tokenize(&self, src: &str) -> Option<Matched> {
        let mut lines = src.split_inclusive('\n');
        let opener = lines.next()?;
        let fence = opening_fence(opener.trim_end_matches(['\n', '\r']))?;
        if fence.indent != 0 {
            return None;
        }
        let tagged = match fence.info.split_whitespace().next() {
            Some(word) if word.eq_ignore_ascii_case("mermaid") => true,
            Some(_) => return None,
            None => false,
        };

        let mut tracker = FenceTracker::new();
        tracker.advance(opener.trim_end_matches(['\n', '\r']));
        let body_start = opener.len();
        let mut offset = body_start;
        for line in lines {
            if tracker.advance(line.trim_end_matches(['\n', '\r'])) == LineClass::Close {
                let body = &src[body_start..offset];
                if !tagged && !starts_with_keyword(body) {
                    return None;
                }
                return Some(Matched {
                    len: offset + line.len(),
                    token: Token::MermaidBlock {
                        text: normalize_diagram(body),
                    },
                });
            }
            offset += line.len();
        }
        None
    }

    fn render(&self, token: &Token, renderer: &Renderer<'_>) -> Option<String> {
        let Token::MermaidBlock { text } = token else {
            return None;
        };
        if text.is_empty() {
            return Some(r#"<pre class="mermaid-error">Empty diagram content</pre>"#.to_string());
        }
        let style = renderer
            .options()
            .block
            .mermaid
            .clone()
            .with("display", "block")
            .with("margin", "1em 0")
            .with("textAlign", "center")
            .with("background", "transparent");
        Some(format!(
            "<div{} class=\"mermaid\">{}</div>",
            style_attr(&resolve_style(&style)),
            html_escape::encode_text(text)
        ))
    }
}

fn starts_with_keyword(body: &str) -> bool {
    let Some(first) = body.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return false;
    };
    DIAGRAM_KEYWORDS.iter().any(|kw| {
        first
            .strip_prefix(kw)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    })
}

/// Canonicalizes diagram source before it is handed to a diagram engine.
///
/// Lines are trimmed and blank lines dropped. Pie charts always get
/// `showData` and quoted labels; other diagrams get their header line
/// canonicalized and the body indented by four spaces. Returns an empty
/// string when there is nothing to draw.
pub fn normalize_diagram(source: &str) -> String {
    let lines: Vec<&str> = source
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };

    let mut out = Vec::with_capacity(lines.len() + 1);
    if first.to_ascii_lowercase().starts_with("pie") {
        out.push("pie showData".to_string());
        let trailing = first[3..].trim();
        let title = trailing
            .split_whitespace()
            .filter(|w| !w.eq_ignore_ascii_case("showdata"))
            .collect::<Vec<_>>()
            .join(" ");
        if !title.is_empty() {
            out.push(pie_line(&title));
        }
        out.extend(rest.iter().map(|l| pie_line(l)));
    } else {
        out.push(diagram_header(first));
        out.extend(rest.iter().map(|l| format!("    {}", l)));
    }
    out.join("\n")
}

fn pie_line(line: &str) -> String {
    if line.to_ascii_lowercase().starts_with("title") {
        return format!("    title {}", line[5..].trim());
    }
    match line.split_once(':') {
        Some((label, value)) => {
            let label = label.trim();
            let quoted = if label.len() >= 2 && label.starts_with('"') && label.ends_with('"') {
                label.to_string()
            } else {
                format!("\"{}\"", label)
            };
            format!("    {}: {}", quoted, value.trim())
        }
        None => format!("    {}", line),
    }
}

fn diagram_header(line: &str) -> String {
    let lower = line.to_ascii_lowercase();
    if lower.contains("sequence") {
        "sequenceDiagram".to_string()
    } else if lower.starts_with("graph") {
        line.to_string()
    } else if lower.contains("flow") {
        let direction = line.split_whitespace().nth(1).unwrap_or("TD");
        format!("graph {}", direction)
    } else {
        line.to_string()
    }
}
