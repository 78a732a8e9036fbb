//! Markdown to inline-styled HTML for article editors.
//!
//! Every element carries its own `style` attribute so the output survives
//! being pasted into editors that strip stylesheets. LaTeX is typeset to
//! MathML, fenced Mermaid blocks become placeholders that
//! [`postprocess::DiagramPostProcessor`] fills with SVG, and named
//! [`template::Template`]s bundle ready-made option sets.
//!
//! ```no_run
//! use mdpress::{Pipeline, RendererOptions};
//!
//! let html = Pipeline::default().render("# Hello\n\n**world**", &RendererOptions::default());
//! assert!(html.contains("<h1>Hello</h1>"));
//! ```

pub mod diagram;
pub mod error;
pub mod extension;
pub mod fence;
pub mod fonts;
pub mod highlight;
pub mod lexer;
pub mod math;
pub mod options;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod renderer;
pub mod style;
pub mod template;
pub mod token;

pub use error::{
    ConfigError, DiagramError, HighlightError, MathError, PostProcessError, TemplateError,
};
pub use options::RendererOptions;
pub use pipeline::Pipeline;
pub use style::{BaseStyle, StyleOptions, StyleValue, resolve_style};
pub use template::Template;

/// Renders `markdown` with the default pipeline.
pub fn render(markdown: &str, options: &RendererOptions) -> String {
    Pipeline::default().render(markdown, options)
}
