use crate::extension::{Extension, Extensions};
use crate::highlight::{Highlighter, SyntectHighlighter};
use crate::lexer::Lexer;
use crate::math::{MathEngine, MathMlEngine};
use crate::options::RendererOptions;
use crate::preprocess::preprocess;
use crate::renderer::Renderer;
use crate::template::Template;

/// Markdown to inline-styled HTML.
///
/// A pipeline holds no per-render state; the same instance can render any
/// number of documents with different options, from any thread.
pub struct Pipeline {
    extensions: Extensions,
    highlighter: Box<dyn Highlighter>,
    math: Box<dyn MathEngine>,
}

impl Pipeline {
    pub fn new(
        extensions: Extensions,
        highlighter: Box<dyn Highlighter>,
        math: Box<dyn MathEngine>,
    ) -> Self {
        Pipeline {
            extensions,
            highlighter,
            math,
        }
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Adds an extension after the built-in ones.
    pub fn with_extension(mut self, extension: Box<dyn Extension>) -> Self {
        self.extensions = self.extensions.with(extension);
        self
    }

    pub fn with_highlighter(mut self, highlighter: Box<dyn Highlighter>) -> Self {
        self.highlighter = highlighter;
        self
    }

    pub fn with_math(mut self, math: Box<dyn MathEngine>) -> Self {
        self.math = math;
        self
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn render(&self, markdown: &str, options: &RendererOptions) -> String {
        let source = preprocess(markdown);
        let tokens = Lexer::new(&self.extensions).lex(&source);
        tracing::debug!(
            bytes = markdown.len(),
            tokens = tokens.len(),
            "markdown tokenized"
        );
        Renderer::new(
            options,
            &self.extensions,
            self.highlighter.as_ref(),
            self.math.as_ref(),
        )
        .render_document(&tokens)
    }

    /// Renders with a template's options, overlaid key by key with
    /// `overrides`, then applies the template's wrapper.
    pub fn render_template(
        &self,
        markdown: &str,
        template: &Template,
        overrides: &RendererOptions,
    ) -> String {
        let options = template.options.overlay(overrides);
        template.apply(&self.render(markdown, &options))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new(
            Extensions::builtin(),
            Box::new(SyntectHighlighter),
            Box::new(MathMlEngine::new()),
        )
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}
