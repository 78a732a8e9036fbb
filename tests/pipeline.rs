use futures::executor::block_on;
use mdpress::diagram::BuiltinDiagramEngine;
use mdpress::highlight::PlainHighlighter;
use mdpress::math::MathEngine;
use mdpress::postprocess::{DiagramPostProcessor, DiagramSession};
use mdpress::{MathError, Pipeline, RendererOptions, StyleOptions, Template, resolve_style};

struct BrokenMath;

impl MathEngine for BrokenMath {
    fn render(&self, _source: &str, _display: bool) -> Result<String, MathError> {
        Err(MathError::Parse("engine offline".into()))
    }
}

fn options_with_color(color: &str) -> RendererOptions {
    let mut options = RendererOptions::default();
    options.base.color = Some(color.into());
    options
}

fn paragraph_tag(html: &str) -> &str {
    let start = html.find("<p").expect("paragraph present");
    let end = start + html[start..].find('>').expect("tag closes");
    &html[start..=end]
}

#[test]
fn base_color_cascades_into_unstyled_paragraphs() {
    let html = Pipeline::default().render("plain text", &options_with_color("#112233"));
    assert_eq!(paragraph_tag(&html), "<p style=\"color: #112233\">");
}

#[test]
fn explicit_paragraph_color_beats_base_color() {
    let mut options = options_with_color("#112233");
    options.block.p.set("color", "#ffffff");
    let html = Pipeline::default().render("plain text", &options);
    let tag = paragraph_tag(&html);
    assert!(tag.contains("#ffffff"));
    assert!(!tag.contains("#112233"));
}

#[test]
fn numeric_values_get_px_except_unitless_properties() {
    let style = StyleOptions::new().with("fontSize", 15).with("lineHeight", 1.75);
    let css = resolve_style(&style);
    assert!(css.contains("font-size: 15px"));
    assert!(css.contains("line-height: 1.75"));
    assert!(!css.contains("1.75px"));
}

#[test]
fn latex_block_becomes_math_markup() {
    let source = "$$\n1+1=2\n$$";
    let html = Pipeline::default().render(source, &RendererOptions::default());
    assert!(html.contains("<math"));
    assert!(!html.contains("$$"));
}

#[test]
fn latex_block_falls_back_to_literal_source() {
    let source = "$$\n1+1=2\n$$";
    let pipeline = Pipeline::default().with_math(Box::new(BrokenMath));
    let html = pipeline.render(source, &RendererOptions::default());
    assert!(html.contains(source));
    assert!(!html.contains("<math"));
}

#[test]
fn malformed_inline_latex_keeps_its_source() {
    let html = Pipeline::default().render("before $\\frac$ after", &RendererOptions::default());
    assert!(html.contains("$\\frac$"));
    assert!(!html.contains("PARSE ERROR"));
    assert!(!html.contains("<math"));
}

#[test]
fn empty_latex_block_is_not_typeset() {
    let html = Pipeline::default().render("$$\n$$", &RendererOptions::default());
    assert!(!html.contains("<math"));
}

#[test]
fn untagged_pie_fence_is_a_diagram_placeholder() {
    let html = Pipeline::default().render(
        "```\npie title Pets\n\"Dogs\": 386\nCats: 85\n```",
        &RendererOptions::default(),
    );
    assert!(html.contains("class=\"mermaid\">pie showData\n    title Pets\n"));
    assert!(html.contains("\"Cats\": 85"));
    assert!(!html.contains("<pre"));
}

#[test]
fn ordered_list_start_attribute_only_when_not_one() {
    let pipeline = Pipeline::default();
    let options = RendererOptions::default();
    assert!(pipeline.render("5. five\n6. six", &options).contains("<ol start=\"5\">"));
    assert!(!pipeline.render("1. one\n2. two", &options).contains("start="));
}

#[test]
fn unknown_code_theme_renders_plain_code() {
    let options = RendererOptions {
        code_theme: Some("no-such-theme".into()),
        ..RendererOptions::default()
    };
    let html = Pipeline::default().render("```rust\nfn a() {}\n```", &options);
    assert!(html.contains("<code class=\"language-rust\">fn a() {}"));
    assert!(!html.contains("<span"));
}

#[test]
fn repeated_renders_do_not_leak_colors() {
    let pipeline = Pipeline::default();
    let mut options = options_with_color("#111111");
    let snapshot = options.clone();

    let first = pipeline.render("text", &options);
    assert_eq!(options, snapshot);

    options.base.color = Some("#222222".into());
    let second = pipeline.render("text", &options);

    assert_eq!(paragraph_tag(&first), "<p style=\"color: #111111\">");
    assert_eq!(paragraph_tag(&second), "<p style=\"color: #222222\">");
    assert!(!second.contains("#111111"));
}

#[test]
fn every_builtin_template_renders_a_full_document() {
    let markdown = "# Title\n\n## Part\n\nSome **bold** and *soft* text with `code`.\n\n\
                    > quoted\n\n- one\n- two\n\n1. first\n\n[link](https://example.com)\n\n\
                    ```js\nlet x = 1;\n```\n";
    let pipeline = Pipeline::default().with_highlighter(Box::new(PlainHighlighter));
    for template in Template::builtins().expect("templates") {
        let html = pipeline.render_template(markdown, &template, &RendererOptions::default());
        assert!(html.contains("<h1"), "{} has no heading", template.id);
        assert!(html.contains("<strong"), "{} lost bold text", template.id);
        assert!(html.contains("<code class=\"language-js\">"), "{}", template.id);
    }
}

#[test]
fn smartisan_template_wraps_in_nice_section() {
    let template = Template::from_builtin("smartisan").expect("smartisan");
    let html = Pipeline::default().render_template("hi", &template, &RendererOptions::default());
    assert!(html.starts_with("<section id=\"nice\""));
}

#[test]
fn markdown_to_svg_end_to_end() {
    let html = Pipeline::default().render(
        "Intro\n\n```mermaid\ngraph LR\nA[Write] --> B[Publish]\n```\n\n```\npie\n\"x\": 1\n```\n",
        &RendererOptions::default(),
    );
    let processor = DiagramPostProcessor::new(BuiltinDiagramEngine::new());
    let session = DiagramSession::new();
    let rendered = block_on(processor.process(&session, &html)).expect("post-process");

    assert!(session.is_initialized());
    assert_eq!(rendered.matches("data-processed=\"true\"").count(), 2);
    assert!(rendered.contains("id=\"mdpress-diagram-0\""));
    assert!(rendered.contains("id=\"mdpress-diagram-1\""));
    assert!(rendered.contains(">Publish</text>"));
    assert!(rendered.contains("x [1]"));

    let again = block_on(processor.process(&session, &rendered)).expect("second pass");
    assert_eq!(again, rendered);
}
