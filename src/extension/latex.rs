use tracing::warn;

use super::{Extension, Level, Matched};
use crate::renderer::{Renderer, style_attr};
use crate::style::resolve_style;
use crate::token::{Token, TokenKind};

/// Display math between `$$` lines.
pub struct LatexBlockExtension;

impl Extension for LatexBlockExtension {
    fn name(&self) -> &'static str {
        "latex-block"
    }

    fn level(&self) -> Level {
        Level::Block
    }

    fn kind(&self) -> TokenKind {
        TokenKind::LatexBlock
    }

    fn start(&self, src: &str) -> bool {
        src.starts_with("$$") && first_line(src).trim_end() == "$$"
    }

    fn tokenize(&self, src: &str) -> Option<Matched> {
        let mut lines = src.split_inclusive('\n');
        let opener = lines.next()?;
        if opener.trim_end() != "$$" {
            return None;
        }

        let body_start = opener.len();
        let mut offset = body_start;
        for line in lines {
            if line.trim() == "$$" {
                let text = src[body_start..offset].trim();
                if text.is_empty() {
                    return None;
                }
                let raw_end = offset + line.trim_end_matches(['\n', '\r']).len();
                return Some(Matched {
                    len: offset + line.len(),
                    token: Token::LatexBlock {
                        text: text.to_string(),
                        raw: src[..raw_end].to_string(),
                    },
                });
            }
            offset += line.len();
        }
        None
    }

    fn render(&self, token: &Token, renderer: &Renderer<'_>) -> Option<String> {
        let Token::LatexBlock { text, raw } = token else {
            return None;
        };
        match renderer.math().render(text, true) {
            Ok(markup) => {
                let style = renderer
                    .options()
                    .block
                    .latex
                    .clone()
                    .with("display", "block")
                    .with("margin", "1em 0")
                    .with("textAlign", "center");
                Some(format!(
                    "<div{}>{}</div>",
                    style_attr(&resolve_style(&style)),
                    markup
                ))
            }
            Err(err) => {
                warn!(error = %err, "math block left as source");
                Some(raw.clone())
            }
        }
    }
}

/// `` $$`…`$$ `` display math and `$…$` inline math inside running text.
pub struct InlineLatexExtension;

impl Extension for InlineLatexExtension {
    fn name(&self) -> &'static str {
        "inline-latex"
    }

    fn level(&self) -> Level {
        Level::Inline
    }

    fn kind(&self) -> TokenKind {
        TokenKind::InlineLatex
    }

    fn start(&self, src: &str) -> bool {
        src.starts_with('$')
    }

    fn tokenize(&self, src: &str) -> Option<Matched> {
        display_formula(src).or_else(|| inline_formula(src))
    }

    fn render(&self, token: &Token, renderer: &Renderer<'_>) -> Option<String> {
        let Token::InlineLatex { text, display, raw } = token else {
            return None;
        };
        match renderer.math().render(text, *display) {
            Ok(markup) => Some(markup),
            Err(err) => {
                warn!(error = %err, "inline math left as source");
                Some(html_escape::encode_text(raw).into_owned())
            }
        }
    }
}

fn first_line(src: &str) -> &str {
    src.split('\n').next().unwrap_or(src)
}

fn display_formula(src: &str) -> Option<Matched> {
    let body = src.strip_prefix("$$`")?;
    let end = body.find("`$$")?;
    let formula = &body[..end];
    if formula.is_empty() || formula.contains('`') {
        return None;
    }
    let len = 3 + end + 3;
    Some(Matched {
        len,
        token: Token::InlineLatex {
            text: formula.trim().to_string(),
            display: true,
            raw: src[..len].to_string(),
        },
    })
}

fn inline_formula(src: &str) -> Option<Matched> {
    let body = src.strip_prefix('$')?;
    let mut escaped = false;
    for (i, ch) in body.char_indices() {
        match ch {
            '\n' => return None,
            '\\' => escaped = !escaped,
            '$' if !escaped => {
                let formula = body[..i].trim();
                if formula.is_empty() {
                    return None;
                }
                let len = 1 + i + 1;
                return Some(Matched {
                    len,
                    token: Token::InlineLatex {
                        text: formula.to_string(),
                        display: false,
                        raw: src[..len].to_string(),
                    },
                });
            }
            _ => escaped = false,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_captures_trimmed_body_and_raw_span() {
        let src = "$$\n  1+1=2\n$$\nafter";
        let matched = LatexBlockExtension.tokenize(src).expect("latex block");
        assert_eq!(matched.len, "$$\n  1+1=2\n$$\n".len());
        assert_eq!(
            matched.token,
            Token::LatexBlock {
                text: "1+1=2".into(),
                raw: "$$\n  1+1=2\n$$".into(),
            }
        );
    }

    #[test]
    fn unclosed_block_falls_through() {
        assert!(LatexBlockExtension.tokenize("$$\nx = 1\n").is_none());
        assert!(!LatexBlockExtension.start("$$ x $$"));
    }

    #[test]
    fn empty_block_is_not_math() {
        assert!(LatexBlockExtension.tokenize("$$\n$$\n").is_none());
        assert!(LatexBlockExtension.tokenize("$$\n   \n$$").is_none());
    }

    #[test]
    fn display_form_is_tried_before_single_dollar() {
        let matched = InlineLatexExtension
            .tokenize("$$`\\frac{a}{b}`$$ tail")
            .expect("display formula");
        assert_eq!(
            matched.token,
            Token::InlineLatex {
                text: "\\frac{a}{b}".into(),
                display: true,
                raw: "$$`\\frac{a}{b}`$$".into(),
            }
        );
    }

    #[test]
    fn inline_formula_stops_at_unescaped_dollar() {
        let matched = InlineLatexExtension
            .tokenize(r"$a \$ b$ rest")
            .expect("inline formula");
        assert_eq!(matched.len, r"$a \$ b$".len());
        assert!(matches!(matched.token, Token::InlineLatex { display: false, .. }));
    }

    #[test]
    fn inline_formula_rejects_newlines_and_empty_bodies() {
        assert!(InlineLatexExtension.tokenize("$a\nb$").is_none());
        assert!(InlineLatexExtension.tokenize("$ $").is_none());
        assert!(InlineLatexExtension.tokenize("$$").is_none());
    }
}
