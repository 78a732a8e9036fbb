//! Built-in diagram engine: pie charts and flowcharts drawn straight to SVG.

mod flowchart;
mod pie;

use std::future::Future;

use parking_lot::Mutex;

use crate::error::DiagramError;
use crate::fonts::{ApproxTextMeasure, TextMeasure};
use crate::style::BaseStyle;

pub use flowchart::{Direction, Edge, EdgeStroke, Flowchart, Node, NodeShape};
pub use pie::{PieChart, Slice};

/// Turns diagram source into standalone SVG markup.
pub trait DiagramEngine: Send + Sync {
    /// One-time setup. Called at most once per session.
    fn initialize(&self) -> Result<(), DiagramError>;

    fn render(
        &self,
        id: &str,
        source: &str,
    ) -> impl Future<Output = Result<String, DiagramError>> + Send;
}

/// Colors and font used for diagram output.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramStyle {
    pub node_fill: String,
    pub node_stroke: String,
    pub node_text: String,
    pub edge_stroke: String,
    pub edge_text: String,
    pub label_fill: String,
    pub background: String,
    pub font_family: String,
    pub font_size: f32,
}

impl Default for DiagramStyle {
    fn default() -> Self {
        Self {
            node_fill: "#f5f5f5".to_string(),
            node_stroke: "#333333".to_string(),
            node_text: "#333333".to_string(),
            edge_stroke: "#333333".to_string(),
            edge_text: "#666666".to_string(),
            label_fill: "#ffffff".to_string(),
            background: "transparent".to_string(),
            font_family: "sans-serif".to_string(),
            font_size: 14.0,
        }
    }
}

impl DiagramStyle {
    pub fn from_theme(text_color: &str, background: &str, fill: &str) -> Self {
        let diagram_fg = pick_higher_contrast(fill, text_color, background);
        let label_fg = pick_higher_contrast(background, text_color, fill);

        Self {
            node_fill: fill.to_string(),
            node_stroke: diagram_fg.clone(),
            node_text: diagram_fg.clone(),
            edge_stroke: diagram_fg,
            edge_text: label_fg,
            label_fill: background.to_string(),
            ..Self::default()
        }
    }

    /// Derives diagram colors from a document's base style. A hex theme
    /// color becomes the outline color.
    pub fn from_base(base: &BaseStyle) -> Self {
        let text = base
            .color()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "#333333".to_string());
        let background = base
            .background
            .as_ref()
            .filter(|b| b.is_set())
            .map(|b| b.to_string())
            .filter(|b| parse_hex_rgb(b).is_some())
            .unwrap_or_else(|| "#ffffff".to_string());

        let mut style = Self::from_theme(&text, &background, "#f5f5f5");
        if let Some(theme) = base
            .theme_color
            .as_ref()
            .map(|t| t.to_string())
            .filter(|t| parse_hex_rgb(t).is_some())
        {
            style.node_stroke = theme.clone();
            style.edge_stroke = theme;
        }
        if let Some(font) = base.font_family.as_ref().filter(|f| f.is_set()) {
            style.font_family = font.to_string();
        }
        style
    }
}

fn parse_hex_rgb(value: &str) -> Option<(f32, f32, f32)> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()? as f32 / 255.0;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()? as f32 / 255.0;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()? as f32 / 255.0;
    Some((r, g, b))
}

fn relative_luminance(color: (f32, f32, f32)) -> f32 {
    let linear = |v: f32| {
        if v <= 0.03928 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    };

    let (r, g, b) = color;
    0.2126 * linear(r) + 0.7152 * linear(g) + 0.0722 * linear(b)
}

fn contrast_ratio(a: &str, b: &str) -> Option<f32> {
    let l1 = relative_luminance(parse_hex_rgb(a)?);
    let l2 = relative_luminance(parse_hex_rgb(b)?);
    let (hi, lo) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
    Some((hi + 0.05) / (lo + 0.05))
}

fn pick_higher_contrast(base: &str, primary: &str, secondary: &str) -> String {
    let p = contrast_ratio(base, primary).unwrap_or(0.0);
    let s = contrast_ratio(base, secondary).unwrap_or(0.0);

    if s > p {
        secondary.to_string()
    } else {
        primary.to_string()
    }
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Wraps drawn content in a root `<svg>` element of the given size.
fn svg_document(id: &str, body: &str, width: f32, height: f32, style: &DiagramStyle) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" id="{id}" width="{w:.2}" height="{h:.2}" viewBox="0 0 {w:.2} {h:.2}" style="max-width: 100%; background: {bg}" role="img">{body}</svg>"#,
        id = escape_xml(id),
        w = width,
        h = height,
        bg = escape_xml(&style.background),
        body = body,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiagramKind {
    Pie,
    Flowchart,
}

fn detect(source: &str) -> Result<DiagramKind, DiagramError> {
    let header = source
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("%%"))
        .ok_or(DiagramError::Empty)?;
    let keyword = header.split_whitespace().next().unwrap_or_default();
    match keyword {
        "pie" => Ok(DiagramKind::Pie),
        "graph" | "flowchart" => Ok(DiagramKind::Flowchart),
        other => Err(DiagramError::Unsupported(other.to_string())),
    }
}

/// Draws pie charts and flowcharts without any external renderer.
pub struct BuiltinDiagramEngine<M: TextMeasure = ApproxTextMeasure> {
    measure: Mutex<M>,
    style: DiagramStyle,
    padding: f32,
}

impl BuiltinDiagramEngine<ApproxTextMeasure> {
    pub fn new() -> Self {
        Self::with_measure(ApproxTextMeasure)
    }
}

impl Default for BuiltinDiagramEngine<ApproxTextMeasure> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: TextMeasure> BuiltinDiagramEngine<M> {
    pub fn with_measure(measure: M) -> Self {
        Self {
            measure: Mutex::new(measure),
            style: DiagramStyle::default(),
            padding: 20.0,
        }
    }

    pub fn with_style(mut self, style: DiagramStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    pub fn style(&self) -> &DiagramStyle {
        &self.style
    }

    /// Parses and lays out `source`, returning an `<svg>` element with the given id.
    pub fn render_sync(&self, id: &str, source: &str) -> Result<String, DiagramError> {
        let mut measure = self.measure.lock();
        let (body, width, height) = match detect(source)? {
            DiagramKind::Pie => {
                let chart = PieChart::parse(source)?;
                pie::render(&chart, &self.style, &mut *measure, self.padding)
            }
            DiagramKind::Flowchart => {
                let chart = Flowchart::parse(source)?;
                flowchart::render(&chart, &self.style, &mut *measure, self.padding)
            }
        };
        Ok(svg_document(id, &body, width, height, &self.style))
    }
}

impl<M: TextMeasure + Send> DiagramEngine for BuiltinDiagramEngine<M> {
    fn initialize(&self) -> Result<(), DiagramError> {
        if !self.style.font_size.is_finite() || self.style.font_size <= 0.0 {
            return Err(DiagramError::Init(format!(
                "invalid font size {}",
                self.style.font_size
            )));
        }
        tracing::debug!(font = %self.style.font_family, "diagram engine ready");
        Ok(())
    }

    fn render(
        &self,
        id: &str,
        source: &str,
    ) -> impl Future<Output = Result<String, DiagramError>> + Send {
        futures::future::ready(self.render_sync(id, source))
    }
}
