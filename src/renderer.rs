//! Token tree to inline-styled HTML.
//!
//! A [`Renderer`] is a read-only view over one render call: options,
//! extension registry and collaborators are borrowed, and every style
//! adjustment (color cascade, forced properties) happens on a copy.

use std::borrow::Cow;

use tracing::{debug, warn};

use crate::error::HighlightError;
use crate::extension::Extensions;
use crate::highlight::Highlighter;
use crate::math::MathEngine;
use crate::options::RendererOptions;
use crate::style::{StyleOptions, cascade_color, resolve_base_style, resolve_style};
use crate::token::Token;

/// ` style="…"`, or nothing when `css` is empty.
pub fn style_attr(css: &str) -> String {
    if css.is_empty() {
        String::new()
    } else {
        format!(
            " style=\"{}\"",
            html_escape::encode_double_quoted_attribute(css)
        )
    }
}

fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_text(text)
}

fn escape_attr(text: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(text)
}

pub struct Renderer<'a> {
    options: &'a RendererOptions,
    extensions: &'a Extensions,
    highlighter: &'a dyn Highlighter,
    math: &'a dyn MathEngine,
}

impl<'a> Renderer<'a> {
    pub fn new(
        options: &'a RendererOptions,
        extensions: &'a Extensions,
        highlighter: &'a dyn Highlighter,
        math: &'a dyn MathEngine,
    ) -> Self {
        Renderer {
            options,
            extensions,
            highlighter,
            math,
        }
    }

    pub fn options(&self) -> &'a RendererOptions {
        self.options
    }

    pub fn math(&self) -> &'a dyn MathEngine {
        self.math
    }

    /// Renders a whole document, wrapped in a `<section>` carrying the base
    /// style when there is one.
    pub fn render_document(&self, tokens: &[Token]) -> String {
        let body = self.render(tokens);
        let base = resolve_base_style(&self.options.base);
        if base.is_empty() {
            body
        } else {
            format!("<section{}>{}</section>", style_attr(&base), body)
        }
    }

    pub fn render(&self, tokens: &[Token]) -> String {
        tokens.iter().map(|t| self.render_token(t)).collect()
    }

    pub fn render_token(&self, token: &Token) -> String {
        let block = &self.options.block;
        let inline = &self.options.inline;

        match token {
            Token::Heading { depth, children } => {
                let tag = format!("h{}", (*depth).clamp(1, 6));
                self.element(&tag, block.heading(*depth), true, &self.render(children))
            }
            Token::Paragraph { children } => {
                self.element("p", &block.p, true, &self.render(children))
            }
            Token::Blockquote { children } => {
                self.element("blockquote", &block.blockquote, true, &self.quote_body(children))
            }
            Token::Code { text, lang } => self.code_block(text, lang.as_deref()),
            Token::Html(html) => html.clone(),
            Token::Rule => "<hr>".to_string(),
            Token::List {
                ordered,
                start,
                items,
            } => self.list(*ordered, *start, items),
            Token::ListItem {
                task,
                checked,
                children,
            } => {
                let mut content = String::new();
                if *task {
                    content.push_str(if *checked {
                        "<input type=\"checkbox\" checked disabled> "
                    } else {
                        "<input type=\"checkbox\" disabled> "
                    });
                }
                content.push_str(&self.render(children));
                self.element("li", &inline.listitem, true, &content)
            }
            Token::Table { head, rows } => self.table(head, rows),
            Token::Text(text) => escape(text).into_owned(),
            Token::CodeSpan(code) => self.element("code", &inline.codespan, false, &escape(code)),
            Token::Emphasis(children) => self.element("em", &inline.em, true, &self.render(children)),
            Token::Strong(children) => {
                let mut style = cascade_color(&inline.strong, &self.options.base).into_owned();
                if !style.has("fontWeight") {
                    style.set("fontWeight", "bold");
                }
                format!(
                    "<strong{}>{}</strong>",
                    style_attr(&resolve_style(&style)),
                    self.render(children)
                )
            }
            Token::Strikethrough(children) => {
                self.element("del", &inline.del, true, &self.render(children))
            }
            Token::Link {
                href,
                title,
                children,
            } => {
                let css = self.css(&inline.link, true);
                format!(
                    "<a href=\"{}\"{}{}>{}</a>",
                    escape_attr(href),
                    title_attr(title),
                    style_attr(&css),
                    self.render(children)
                )
            }
            Token::Image { href, title, alt } => {
                let css = self.css(&block.image, false);
                format!(
                    "<img src=\"{}\"{} alt=\"{}\"{}>",
                    escape_attr(href),
                    title_attr(title),
                    escape_attr(alt),
                    style_attr(&css)
                )
            }
            Token::SoftBreak | Token::HardBreak => "<br>".to_string(),
            Token::LatexBlock { .. }
            | Token::InlineLatex { .. }
            | Token::MermaidBlock { .. }
            | Token::Footnote { .. } => self.extension(token),
        }
    }

    fn css(&self, style: &StyleOptions, cascade: bool) -> String {
        if cascade {
            resolve_style(&cascade_color(style, &self.options.base))
        } else {
            resolve_style(style)
        }
    }

    fn element(&self, tag: &str, style: &StyleOptions, cascade: bool, content: &str) -> String {
        format!(
            "<{tag}{}>{content}</{tag}>",
            style_attr(&self.css(style, cascade))
        )
    }

    /// Paragraphs directly inside a quote are inlined so the quote style
    /// governs their text; consecutive ones are separated by `<br>`.
    fn quote_body(&self, children: &[Token]) -> String {
        let mut out = String::new();
        let mut after_paragraph = false;
        for child in children {
            match child {
                Token::Paragraph { children } => {
                    if after_paragraph {
                        out.push_str("<br>");
                    }
                    out.push_str(&self.render(children));
                    after_paragraph = true;
                }
                other => {
                    out.push_str(&self.render_token(other));
                    after_paragraph = false;
                }
            }
        }
        out
    }

    fn code_block(&self, text: &str, lang: Option<&str>) -> String {
        let css = self.css(&self.options.block.code_pre, false);
        let lang = lang.map(str::trim).filter(|l| !l.is_empty());

        let body = match lang {
            Some(lang) => self
                .highlighter
                .highlight(text, lang, self.options.code_theme())
                .unwrap_or_else(|err| {
                    match &err {
                        HighlightError::UnknownLanguage(_) => {
                            debug!(error = %err, "code block left unhighlighted")
                        }
                        _ => warn!(error = %err, "code block left unhighlighted"),
                    }
                    escape(text).into_owned()
                }),
            None => escape(text).into_owned(),
        };
        let class = lang
            .map(|l| format!(" class=\"language-{}\"", escape_attr(l)))
            .unwrap_or_default();
        format!("<pre{}><code{}>{}</code></pre>", style_attr(&css), class, body)
    }

    fn list(&self, ordered: bool, start: u64, items: &[Token]) -> String {
        let (tag, style) = if ordered {
            ("ol", &self.options.block.ol)
        } else {
            ("ul", &self.options.block.ul)
        };
        let start_attr = if ordered && start != 1 {
            format!(" start=\"{}\"", start)
        } else {
            String::new()
        };
        format!(
            "<{tag}{}{}>{}</{tag}>",
            start_attr,
            style_attr(&self.css(style, true)),
            self.render(items)
        )
    }

    fn table(&self, head: &[Vec<Token>], rows: &[Vec<Vec<Token>>]) -> String {
        let mut out = String::from("<table>");
        if !head.is_empty() {
            out.push_str("<thead><tr>");
            for cell in head {
                out.push_str(&format!("<th>{}</th>", self.render(cell)));
            }
            out.push_str("</tr></thead>");
        }
        if !rows.is_empty() {
            out.push_str("<tbody>");
            for row in rows {
                out.push_str("<tr>");
                for cell in row {
                    out.push_str(&format!("<td>{}</td>", self.render(cell)));
                }
                out.push_str("</tr>");
            }
            out.push_str("</tbody>");
        }
        out.push_str("</table>");
        out
    }

    fn extension(&self, token: &Token) -> String {
        self.extensions
            .for_kind(token.kind())
            .and_then(|ext| ext.render(token, self))
            .unwrap_or_else(|| unregistered(token))
    }
}

fn title_attr(title: &str) -> String {
    if title.is_empty() {
        String::new()
    } else {
        format!(" title=\"{}\"", escape_attr(title))
    }
}

/// Output for extension tokens when no registered extension renders them.
fn unregistered(token: &Token) -> String {
    match token {
        Token::LatexBlock { raw, .. } => raw.clone(),
        Token::InlineLatex { raw, .. } => escape(raw).into_owned(),
        Token::MermaidBlock { text } => format!(
            "<pre><code class=\"language-mermaid\">{}</code></pre>",
            escape(text)
        ),
        Token::Footnote { id } => format!("[^{}]", escape(id)),
        other => escape(&Token::plain_text(std::slice::from_ref(other))).into_owned(),
    }
}
