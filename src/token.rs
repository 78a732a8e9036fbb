/// A node of the parsed document.
///
/// Tokens are built once by the lexer, read once by the renderer, and
/// dropped with the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Heading { depth: u8, children: Vec<Token> },
    Paragraph { children: Vec<Token> },
    Blockquote { children: Vec<Token> },
    Code { text: String, lang: Option<String> },
    Html(String),
    Rule,
    List { ordered: bool, start: u64, items: Vec<Token> },
    ListItem { task: bool, checked: bool, children: Vec<Token> },
    Table { head: Vec<Vec<Token>>, rows: Vec<Vec<Vec<Token>>> },

    Text(String),
    CodeSpan(String),
    Emphasis(Vec<Token>),
    Strong(Vec<Token>),
    Strikethrough(Vec<Token>),
    Link { href: String, title: String, children: Vec<Token> },
    Image { href: String, title: String, alt: String },
    SoftBreak,
    HardBreak,

    /// `$$` fenced display math. `raw` is the matched source span.
    LatexBlock { text: String, raw: String },
    InlineLatex { text: String, display: bool, raw: String },
    MermaidBlock { text: String },
    Footnote { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Heading,
    Paragraph,
    Blockquote,
    Code,
    Html,
    Rule,
    List,
    ListItem,
    Table,
    Text,
    CodeSpan,
    Emphasis,
    Strong,
    Strikethrough,
    Link,
    Image,
    SoftBreak,
    HardBreak,
    LatexBlock,
    InlineLatex,
    MermaidBlock,
    Footnote,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Heading { .. } => TokenKind::Heading,
            Token::Paragraph { .. } => TokenKind::Paragraph,
            Token::Blockquote { .. } => TokenKind::Blockquote,
            Token::Code { .. } => TokenKind::Code,
            Token::Html(_) => TokenKind::Html,
            Token::Rule => TokenKind::Rule,
            Token::List { .. } => TokenKind::List,
            Token::ListItem { .. } => TokenKind::ListItem,
            Token::Table { .. } => TokenKind::Table,
            Token::Text(_) => TokenKind::Text,
            Token::CodeSpan(_) => TokenKind::CodeSpan,
            Token::Emphasis(_) => TokenKind::Emphasis,
            Token::Strong(_) => TokenKind::Strong,
            Token::Strikethrough(_) => TokenKind::Strikethrough,
            Token::Link { .. } => TokenKind::Link,
            Token::Image { .. } => TokenKind::Image,
            Token::SoftBreak => TokenKind::SoftBreak,
            Token::HardBreak => TokenKind::HardBreak,
            Token::LatexBlock { .. } => TokenKind::LatexBlock,
            Token::InlineLatex { .. } => TokenKind::InlineLatex,
            Token::MermaidBlock { .. } => TokenKind::MermaidBlock,
            Token::Footnote { .. } => TokenKind::Footnote,
        }
    }

    /// Concatenated text content, used for image alt text and table cells.
    pub fn plain_text(tokens: &[Token]) -> String {
        let mut out = String::new();
        for token in tokens {
            match token {
                Token::Text(t) | Token::CodeSpan(t) => out.push_str(t),
                Token::Emphasis(c) | Token::Strong(c) | Token::Strikethrough(c) => {
                    out.push_str(&Token::plain_text(c))
                }
                Token::Link { children, .. } => out.push_str(&Token::plain_text(children)),
                Token::InlineLatex { raw, .. } => out.push_str(raw),
                Token::Footnote { id } => {
                    out.push_str("[^");
                    out.push_str(id);
                    out.push(']');
                }
                Token::SoftBreak | Token::HardBreak => out.push(' '),
                _ => {}
            }
        }
        out
    }
}
