use std::sync::LazyLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::error::HighlightError;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Theme names accepted in configuration, mapped to syntect's bundled themes.
const THEME_ALIASES: &[(&str, &str)] = &[
    ("github", "InspiredGitHub"),
    ("solarized-dark", "Solarized (dark)"),
    ("solarized-light", "Solarized (light)"),
    ("ocean-dark", "base16-ocean.dark"),
    ("ocean-light", "base16-ocean.light"),
    ("eighties", "base16-eighties.dark"),
    ("mocha", "base16-mocha.dark"),
];

/// Turns code into the inner HTML of a `<code>` element.
pub trait Highlighter: Send + Sync {
    fn highlight(&self, code: &str, lang: &str, theme: &str) -> Result<String, HighlightError>;
}

/// Inline-styled highlighting with syntect's bundled syntaxes and themes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntectHighlighter;

impl SyntectHighlighter {
    pub fn themes() -> Vec<&'static str> {
        THEME_ALIASES.iter().map(|(alias, _)| *alias).collect()
    }

    fn theme(name: &str) -> Result<&'static Theme, HighlightError> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        let key = THEME_ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map_or(name.trim(), |(_, key)| *key);
        THEME_SET
            .themes
            .get(key)
            .ok_or_else(|| HighlightError::UnknownTheme(name.to_string()))
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, lang: &str, theme: &str) -> Result<String, HighlightError> {
        let theme = Self::theme(theme)?;
        let syntax = SYNTAX_SET
            .find_syntax_by_token(lang)
            .ok_or_else(|| HighlightError::UnknownLanguage(lang.to_string()))?;

        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut html = String::with_capacity(code.len() * 4);
        for line in LinesWithEndings::from(code) {
            let regions = highlighter
                .highlight_line(line, &SYNTAX_SET)
                .map_err(|e| HighlightError::Syntect(e.to_string()))?;
            let styled = styled_line_to_highlighted_html(&regions, IncludeBackground::No)
                .map_err(|e| HighlightError::Syntect(e.to_string()))?;
            html.push_str(&styled);
        }
        Ok(html)
    }
}

/// Escapes code without any styling.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, code: &str, _lang: &str, _theme: &str) -> Result<String, HighlightError> {
        Ok(html_escape::encode_text(code).into_owned())
    }
}
