//! Pluggable recognizers for syntax outside CommonMark.
//!
//! Each extension probes raw source at a scan position, consumes the span it
//! recognizes into a [`Token`], and later renders tokens of its kind. The
//! lexer tries extensions in registry order before the standard grammar.

mod footnote;
mod latex;
mod mermaid;

pub use footnote::FootnoteExtension;
pub use latex::{InlineLatexExtension, LatexBlockExtension};
pub use mermaid::{MermaidExtension, normalize_diagram};

use crate::renderer::Renderer;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Probed at unindented line starts outside fenced code.
    Block,
    /// Probed at every position of ordinary text.
    Inline,
}

/// A recognized span: `len` bytes of source became `token`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matched {
    pub len: usize,
    pub token: Token,
}

pub trait Extension: Send + Sync {
    fn name(&self) -> &'static str;

    fn level(&self) -> Level;

    /// Kind of token this extension produces and renders.
    fn kind(&self) -> TokenKind;

    /// Cheap check that the syntax could start at the beginning of `src`.
    fn start(&self, src: &str) -> bool;

    /// Consumes a match at the beginning of `src`. `None` means fall through.
    fn tokenize(&self, src: &str) -> Option<Matched>;

    /// Renders a token of this extension's kind. `None` defers to the
    /// renderer's plain fallback.
    fn render(&self, token: &Token, renderer: &Renderer<'_>) -> Option<String>;
}

/// Ordered extension list. Earlier entries win when several match at the
/// same position, so narrower syntax must be registered first.
pub struct Extensions {
    entries: Vec<Box<dyn Extension>>,
}

impl Extensions {
    pub fn new(entries: Vec<Box<dyn Extension>>) -> Self {
        Extensions { entries }
    }

    pub fn empty() -> Self {
        Extensions::new(Vec::new())
    }

    /// Mermaid fences before `$$` blocks; `` $$`…`$$ `` and `$…$` before footnotes.
    pub fn builtin() -> Self {
        Extensions::new(vec![
            Box::new(MermaidExtension),
            Box::new(LatexBlockExtension),
            Box::new(InlineLatexExtension),
            Box::new(FootnoteExtension),
        ])
    }

    pub fn with(mut self, extension: Box<dyn Extension>) -> Self {
        self.entries.push(extension);
        self
    }

    pub fn at_level(&self, level: Level) -> impl Iterator<Item = &dyn Extension> {
        self.entries
            .iter()
            .map(|e| e.as_ref())
            .filter(move |e| e.level() == level)
    }

    /// First registered extension of `level` that matches at the start of `src`.
    pub fn tokenize(&self, level: Level, src: &str) -> Option<Matched> {
        self.at_level(level)
            .filter(|ext| ext.start(src))
            .find_map(|ext| ext.tokenize(src))
    }

    pub fn for_kind(&self, kind: TokenKind) -> Option<&dyn Extension> {
        self.entries
            .iter()
            .map(|e| e.as_ref())
            .find(|e| e.kind() == kind)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name()).collect()
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_order_is_most_specific_first() {
        assert_eq!(
            Extensions::builtin().names(),
            vec!["mermaid", "latex-block", "inline-latex", "footnote"]
        );
    }

    #[test]
    fn block_probe_prefers_mermaid_over_code() {
        let extensions = Extensions::builtin();
        let matched = extensions
            .tokenize(Level::Block, "```\npie\nA: 1\n```\n")
            .expect("diagram fence");
        assert_eq!(matched.token.kind(), TokenKind::MermaidBlock);
        assert_eq!(matched.len, "```\npie\nA: 1\n```\n".len());
    }

    #[test]
    fn inline_probe_ignores_block_extensions() {
        let extensions = Extensions::builtin();
        assert!(extensions.tokenize(Level::Inline, "$$\nx\n$$").is_none());
        let matched = extensions
            .tokenize(Level::Inline, "[^1] rest")
            .expect("footnote");
        assert_eq!(matched.token, Token::Footnote { id: "1".into() });
    }

    #[test]
    fn empty_registry_matches_nothing() {
        assert!(Extensions::empty().tokenize(Level::Block, "$$\nx\n$$").is_none());
    }
}
