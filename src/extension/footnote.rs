use super::{Extension, Level, Matched};
use crate::renderer::{Renderer, style_attr};
use crate::style::resolve_style;
use crate::token::{Token, TokenKind};

/// `[^id]` references. Definitions are not collected.
pub struct FootnoteExtension;

impl Extension for FootnoteExtension {
    fn name(&self) -> &'static str {
        "footnote"
    }

    fn level(&self) -> Level {
        Level::Inline
    }

    fn kind(&self) -> TokenKind {
        TokenKind::Footnote
    }

    fn start(&self, src: &str) -> bool {
        src.starts_with("[^")
    }

    fn tokenize(&self, src: &str) -> Option<Matched> {
        let body = src.strip_prefix("[^")?;
        let end = body.find(']')?;
        let id = &body[..end];
        if id.trim().is_empty() || id.contains('\n') {
            return None;
        }
        Some(Matched {
            len: 2 + end + 1,
            token: Token::Footnote { id: id.to_string() },
        })
    }

    fn render(&self, token: &Token, renderer: &Renderer<'_>) -> Option<String> {
        let Token::Footnote { id } = token else {
            return None;
        };
        let style = resolve_style(&renderer.options().inline.footnote);
        Some(format!(
            "<sup{}><a href=\"#fn-{}\">[{}]</a></sup>",
            style_attr(&style),
            html_escape::encode_double_quoted_attribute(id),
            html_escape::encode_text(id)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_captures_id() {
        let matched = FootnoteExtension.tokenize("[^note-1] tail").expect("footnote");
        assert_eq!(matched.len, 9);
        assert_eq!(matched.token, Token::Footnote { id: "note-1".into() });
    }

    #[test]
    fn empty_or_unterminated_references_fall_through() {
        assert!(FootnoteExtension.tokenize("[^]").is_none());
        assert!(FootnoteExtension.tokenize("[^open").is_none());
        assert!(FootnoteExtension.tokenize("[^a\nb]").is_none());
    }
}
