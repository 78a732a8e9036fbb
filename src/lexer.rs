//! Markdown source to [`Token`] tree.
//!
//! Extensions run first: a masking pass replaces every span an extension
//! recognizes with a private-use marker, so pulldown-cmark never sees the
//! extension syntax. The event stream is then folded into tokens and the
//! markers are expanded back, or restored to their source text wherever the
//! surrounding construct is literal (code, raw HTML, link targets).

use std::borrow::Cow;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use tracing::debug;

use crate::extension::{Extensions, Level};
use crate::fence::{FenceTracker, LineClass};
use crate::preprocess::find_backtick_run;
use crate::token::{Token, TokenKind};

const MARKER_OPEN: char = '\u{E000}';
const MARKER_CLOSE: char = '\u{E001}';

pub struct Lexer<'a> {
    extensions: &'a Extensions,
}

impl<'a> Lexer<'a> {
    pub fn new(extensions: &'a Extensions) -> Self {
        Lexer { extensions }
    }

    pub fn lex(&self, src: &str) -> Vec<Token> {
        let (masked, slots) = mask(src, self.extensions);
        let slot_count = slots.len();

        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut builder = TreeBuilder::new(slots);
        for event in Parser::new_ext(&masked, options) {
            builder.push_event(event);
        }
        let tokens = builder.finish();
        debug!(
            tokens = tokens.len(),
            extension_matches = slot_count,
            "lexed document"
        );
        tokens
    }
}

/// An extension match parked behind a marker.
struct Slot {
    raw: String,
    token: Option<Token>,
}

fn marker(index: usize) -> String {
    format!("{}{}{}", MARKER_OPEN, index, MARKER_CLOSE)
}

fn mask(src: &str, extensions: &Extensions) -> (String, Vec<Slot>) {
    let src: Cow<'_, str> = if src.contains([MARKER_OPEN, MARKER_CLOSE]) {
        Cow::Owned(src.replace([MARKER_OPEN, MARKER_CLOSE], "\u{FFFD}"))
    } else {
        Cow::Borrowed(src)
    };
    let src = src.as_ref();
    let mut out = String::with_capacity(src.len() + 16);
    let mut slots = Vec::new();
    let mut tracker = FenceTracker::new();
    let mut pos = 0;

    while pos < src.len() {
        let line_end = src[pos..].find('\n').map_or(src.len(), |i| pos + i + 1);
        let line = &src[pos..line_end];
        let content = line.trim_end_matches(['\n', '\r']);

        if tracker.in_fence() {
            tracker.advance(content);
            out.push_str(line);
            pos = line_end;
            continue;
        }

        if !line.starts_with([' ', '\t'])
            && let Some(matched) = extensions.tokenize(Level::Block, &src[pos..])
        {
            out.push_str("\n\n");
            out.push_str(&marker(slots.len()));
            out.push_str("\n\n");
            slots.push(Slot {
                raw: src[pos..pos + matched.len].to_string(),
                token: Some(matched.token),
            });
            pos += matched.len.max(1);
            continue;
        }

        if matches!(tracker.advance(content), LineClass::Open(_)) {
            out.push_str(line);
            pos = line_end;
            continue;
        }

        mask_inline(content, extensions, &mut out, &mut slots);
        out.push_str(&line[content.len()..]);
        pos = line_end;
    }
    (out, slots)
}

fn mask_inline(line: &str, extensions: &Extensions, out: &mut String, slots: &mut Vec<Slot>) {
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < line.len() {
        let rest = &line[i..];
        if let Some(matched) = extensions.tokenize(Level::Inline, rest)
            && matched.len > 0
        {
            out.push_str(&marker(slots.len()));
            slots.push(Slot {
                raw: rest[..matched.len].to_string(),
                token: Some(matched.token),
            });
            i += matched.len;
            continue;
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        match ch {
            '\\' => {
                let escaped = rest[1..].chars().next().map_or(0, char::len_utf8);
                out.push_str(&rest[..1 + escaped]);
                i += 1 + escaped;
            }
            '`' => {
                let run = rest.bytes().take_while(|b| *b == b'`').count();
                let end = find_backtick_run(bytes, i + run, run).unwrap_or(i + run);
                out.push_str(&line[i..end]);
                i = end;
            }
            _ => {
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
}

enum Frame {
    Root,
    Paragraph,
    Heading(u8),
    Blockquote,
    List { ordered: bool, start: u64 },
    Item { task: bool, checked: bool },
    Code { lang: Option<String>, text: String },
    HtmlBlock(String),
    Table { head: Vec<Vec<Token>>, rows: Vec<Vec<Vec<Token>>> },
    TableHead(Vec<Vec<Token>>),
    TableRow(Vec<Vec<Token>>),
    TableCell,
    Emphasis,
    Strong,
    Strikethrough,
    Link { href: String, title: String },
    Image { href: String, title: String },
    /// `<strong>` seen as inline HTML, waiting for its `</strong>`.
    HtmlStrong(String),
    /// Constructs this lexer does not model; children pass through.
    Transparent,
}

struct Open {
    frame: Frame,
    children: Vec<Token>,
}

struct TreeBuilder {
    stack: Vec<Open>,
    slots: Vec<Slot>,
    pending: String,
}

impl TreeBuilder {
    fn new(slots: Vec<Slot>) -> Self {
        TreeBuilder {
            stack: vec![Open {
                frame: Frame::Root,
                children: Vec::new(),
            }],
            slots,
            pending: String::new(),
        }
    }

    fn push_event(&mut self, event: Event<'_>) {
        if let Event::Text(text) = &event
            && !self.in_literal()
        {
            self.pending.push_str(text);
            return;
        }
        self.flush_text();

        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.push_literal(&text),
            Event::Code(code) => {
                let code = self.restore(&code);
                self.push(Token::CodeSpan(code));
            }
            Event::Html(html) => self.push_literal(&html),
            Event::InlineHtml(html) => self.inline_html(&html),
            Event::SoftBreak => self.push(Token::SoftBreak),
            Event::HardBreak => self.push(Token::HardBreak),
            Event::Rule => self.push(Token::Rule),
            Event::TaskListMarker(done) => {
                let item = self.stack.iter_mut().rev().find_map(|open| match &mut open.frame {
                    Frame::Item { task, checked } => Some((task, checked)),
                    _ => None,
                });
                if let Some((task, checked)) = item {
                    *task = true;
                    *checked = done;
                }
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let frame = match tag {
            Tag::Paragraph => Frame::Paragraph,
            Tag::Heading { level, .. } => Frame::Heading(heading_depth(level)),
            Tag::BlockQuote(_) => Frame::Blockquote,
            Tag::CodeBlock(kind) => Frame::Code {
                lang: match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(|lang| self.restore(lang)),
                    CodeBlockKind::Indented => None,
                },
                text: String::new(),
            },
            Tag::HtmlBlock => Frame::HtmlBlock(String::new()),
            Tag::List(start) => Frame::List {
                ordered: start.is_some(),
                start: start.unwrap_or(1),
            },
            Tag::Item => Frame::Item {
                task: false,
                checked: false,
            },
            Tag::Table(_) => Frame::Table {
                head: Vec::new(),
                rows: Vec::new(),
            },
            Tag::TableHead => Frame::TableHead(Vec::new()),
            Tag::TableRow => Frame::TableRow(Vec::new()),
            Tag::TableCell => Frame::TableCell,
            Tag::Emphasis => Frame::Emphasis,
            Tag::Strong => Frame::Strong,
            Tag::Strikethrough => Frame::Strikethrough,
            Tag::Link {
                dest_url, title, ..
            } => Frame::Link {
                href: self.restore(&dest_url),
                title: self.restore(&title),
            },
            Tag::Image {
                dest_url, title, ..
            } => Frame::Image {
                href: self.restore(&dest_url),
                title: self.restore(&title),
            },
            _ => Frame::Transparent,
        };
        self.stack.push(Open {
            frame,
            children: Vec::new(),
        });
    }

    fn end(&mut self) {
        self.unwind_html_strong();
        if self.stack.len() <= 1 {
            return;
        }
        let Some(Open { frame, children }) = self.stack.pop() else {
            return;
        };

        let token = match frame {
            Frame::Root => return,
            Frame::Paragraph => match <[Token; 1]>::try_from(children) {
                Ok([only]) if is_block_extension(&only) => only,
                Ok([only]) => Token::Paragraph {
                    children: vec![only],
                },
                Err(children) => Token::Paragraph { children },
            },
            Frame::Heading(depth) => Token::Heading { depth, children },
            Frame::Blockquote => Token::Blockquote { children },
            Frame::List { ordered, start } => Token::List {
                ordered,
                start,
                items: children,
            },
            Frame::Item { task, checked } => Token::ListItem {
                task,
                checked,
                children,
            },
            Frame::Code { lang, mut text } => {
                if text.ends_with('\n') {
                    text.pop();
                }
                Token::Code {
                    text: self.restore(&text),
                    lang,
                }
            }
            Frame::HtmlBlock(html) => Token::Html(self.restore(&html)),
            Frame::Table { head, rows } => Token::Table { head, rows },
            Frame::TableHead(cells) => {
                if let Some(Open {
                    frame: Frame::Table { head, .. },
                    ..
                }) = self.stack.last_mut()
                {
                    *head = cells;
                }
                return;
            }
            Frame::TableRow(cells) => {
                if let Some(Open {
                    frame: Frame::Table { rows, .. },
                    ..
                }) = self.stack.last_mut()
                {
                    rows.push(cells);
                }
                return;
            }
            Frame::TableCell => {
                if let Some(Open {
                    frame: Frame::TableHead(cells) | Frame::TableRow(cells),
                    ..
                }) = self.stack.last_mut()
                {
                    cells.push(children);
                }
                return;
            }
            Frame::Emphasis => Token::Emphasis(children),
            Frame::Strong => Token::Strong(children),
            Frame::Strikethrough => Token::Strikethrough(children),
            Frame::Link { href, title } => Token::Link {
                href,
                title,
                children,
            },
            Frame::Image { href, title } => Token::Image {
                href,
                title,
                alt: Token::plain_text(&children),
            },
            Frame::HtmlStrong(_) => Token::Strong(children),
            Frame::Transparent => {
                for child in children {
                    self.push(child);
                }
                return;
            }
        };
        self.push(token);
    }

    fn inline_html(&mut self, html: &str) {
        let tag = html.trim().to_ascii_lowercase();
        if tag == "<strong>" {
            self.stack.push(Open {
                frame: Frame::HtmlStrong(html.to_string()),
                children: Vec::new(),
            });
            return;
        }
        if tag == "</strong>"
            && matches!(
                self.stack.last(),
                Some(Open {
                    frame: Frame::HtmlStrong(_),
                    ..
                })
            )
        {
            if let Some(Open { children, .. }) = self.stack.pop() {
                self.push(Token::Strong(children));
            }
            return;
        }
        let html = self.restore(html);
        self.push(Token::Html(html));
    }

    /// Unmatched `<strong>` tags fall back to raw HTML around their children.
    fn unwind_html_strong(&mut self) {
        while matches!(
            self.stack.last(),
            Some(Open {
                frame: Frame::HtmlStrong(_),
                ..
            })
        ) {
            if let Some(Open {
                frame: Frame::HtmlStrong(open),
                children,
            }) = self.stack.pop()
            {
                self.push(Token::Html(open));
                for child in children {
                    self.push(child);
                }
            }
        }
    }

    fn in_literal(&self) -> bool {
        matches!(
            self.stack.last(),
            Some(Open {
                frame: Frame::Code { .. } | Frame::HtmlBlock(_),
                ..
            })
        )
    }

    fn push_literal(&mut self, text: &str) {
        match self.stack.last_mut() {
            Some(Open {
                frame: Frame::Code { text: buf, .. } | Frame::HtmlBlock(buf),
                ..
            }) => buf.push_str(text),
            _ => {
                let html = self.restore(text);
                self.push(Token::Html(html));
            }
        }
    }

    fn push(&mut self, token: Token) {
        let Some(open) = self.stack.last_mut() else {
            return;
        };
        match (open.children.last_mut(), token) {
            (Some(Token::Text(prev)), Token::Text(next)) => prev.push_str(&next),
            (_, token) => open.children.push(token),
        }
    }

    fn flush_text(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        for token in self.expand(&text) {
            self.push(token);
        }
    }

    /// Splits text at markers, handing each parked token out once.
    fn expand(&mut self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut rest = text;
        while let Some((before, index, after)) = split_marker(rest) {
            if !before.is_empty() {
                tokens.push(Token::Text(before.to_string()));
            }
            match self.slots.get_mut(index) {
                Some(slot) => match slot.token.take() {
                    Some(token) => tokens.push(token),
                    None => tokens.push(Token::Text(slot.raw.clone())),
                },
                None => tokens.push(Token::Text(marker(index))),
            }
            rest = after;
        }
        if !rest.is_empty() {
            tokens.push(Token::Text(rest.to_string()));
        }
        tokens
    }

    /// Replaces markers with the source text they stood for.
    fn restore(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some((before, index, after)) = split_marker(rest) {
            out.push_str(before);
            match self.slots.get(index) {
                Some(slot) => out.push_str(&slot.raw),
                None => out.push_str(&marker(index)),
            }
            rest = after;
        }
        out.push_str(rest);
        out
    }

    fn finish(mut self) -> Vec<Token> {
        self.flush_text();
        while self.stack.len() > 1 {
            self.end();
        }
        self.stack.pop().map(|root| root.children).unwrap_or_default()
    }
}

fn split_marker(text: &str) -> Option<(&str, usize, &str)> {
    let open = text.find(MARKER_OPEN)?;
    let digits_start = open + MARKER_OPEN.len_utf8();
    let close = digits_start + text[digits_start..].find(MARKER_CLOSE)?;
    let index = text[digits_start..close].parse().ok()?;
    Some((
        &text[..open],
        index,
        &text[close + MARKER_CLOSE.len_utf8()..],
    ))
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn is_block_extension(token: &Token) -> bool {
    matches!(token.kind(), TokenKind::LatexBlock | TokenKind::MermaidBlock)
}
