use std::f32::consts::{PI, TAU};

use crate::error::DiagramError;
use crate::fonts::TextMeasure;

use super::{DiagramStyle, escape_xml};

const PALETTE: &[&str] = &[
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

const RADIUS: f32 = 110.0;
const LEGEND_GAP: f32 = 28.0;
const SWATCH: f32 = 14.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PieChart {
    pub title: Option<String>,
    pub show_data: bool,
    pub slices: Vec<Slice>,
}

impl PieChart {
    pub fn parse(source: &str) -> Result<Self, DiagramError> {
        let mut lines = source
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("%%"));
        let header = lines.next().ok_or(DiagramError::Empty)?;
        let mut rest = header
            .strip_prefix("pie")
            .ok_or_else(|| DiagramError::Parse(format!("not a pie chart: '{}'", header)))?
            .trim();

        let mut chart = PieChart::default();
        if let Some(after) = rest.strip_prefix("showData") {
            chart.show_data = true;
            rest = after.trim();
        }
        if let Some(title) = rest.strip_prefix("title") {
            chart.title = Some(title.trim().to_string()).filter(|t| !t.is_empty());
        }

        for line in lines {
            if let Some(title) = line.strip_prefix("title") {
                chart.title = Some(title.trim().to_string()).filter(|t| !t.is_empty());
                continue;
            }
            if line.starts_with("accTitle") || line.starts_with("accDescr") {
                continue;
            }
            let (label, value) = line
                .rsplit_once(':')
                .ok_or_else(|| DiagramError::Parse(format!("expected 'label: value', got '{}'", line)))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| DiagramError::Parse(format!("invalid slice value in '{}'", line)))?;
            if !value.is_finite() || value < 0.0 {
                return Err(DiagramError::Parse(format!(
                    "slice values must be non-negative, got '{}'",
                    line
                )));
            }
            let label = label.trim();
            let label = label
                .strip_prefix('"')
                .and_then(|l| l.strip_suffix('"'))
                .unwrap_or(label);
            chart.slices.push(Slice {
                label: label.to_string(),
                value,
            });
        }

        if chart.slices.is_empty() {
            return Err(DiagramError::Parse("pie chart has no slices".to_string()));
        }
        Ok(chart)
    }

    pub fn total(&self) -> f64 {
        self.slices.iter().map(|s| s.value).sum()
    }
}

fn format_value(value: f64) -> String {
    format!("{}", value)
}

fn point_at(cx: f32, cy: f32, r: f32, angle: f32) -> (f32, f32) {
    (cx + r * angle.cos(), cy + r * angle.sin())
}

pub(super) fn render<M: TextMeasure + ?Sized>(
    chart: &PieChart,
    style: &DiagramStyle,
    measure: &mut M,
    padding: f32,
) -> (String, f32, f32) {
    let mut svg = String::new();
    let font_size = style.font_size;
    let total = chart.total();

    let title_height = if chart.title.is_some() {
        font_size * 2.2
    } else {
        0.0
    };
    let cx = padding + RADIUS;
    let cy = padding + title_height + RADIUS;

    // Angles run clockwise from twelve o'clock.
    let mut angle = -PI / 2.0;
    let visible = chart.slices.iter().filter(|s| s.value > 0.0).count();
    for (i, slice) in chart.slices.iter().enumerate() {
        if slice.value <= 0.0 || total <= 0.0 {
            continue;
        }
        let fraction = (slice.value / total) as f32;
        let color = PALETTE[i % PALETTE.len()];
        let sweep = fraction * TAU;

        if visible == 1 {
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" stroke="{}" stroke-width="1.5" />"#,
                cx, cy, RADIUS, color, style.label_fill
            ));
        } else {
            let (x1, y1) = point_at(cx, cy, RADIUS, angle);
            let (x2, y2) = point_at(cx, cy, RADIUS, angle + sweep);
            let large_arc = if sweep > PI { 1 } else { 0 };
            svg.push_str(&format!(
                r#"<path d="M {:.2} {:.2} L {:.2} {:.2} A {:.2} {:.2} 0 {} 1 {:.2} {:.2} Z" fill="{}" stroke="{}" stroke-width="1.5" />"#,
                cx, cy, x1, y1, RADIUS, RADIUS, large_arc, x2, y2, color, style.label_fill
            ));
        }

        if fraction >= 0.03 {
            let (lx, ly) = point_at(cx, cy, RADIUS * 0.7, angle + sweep / 2.0);
            svg.push_str(&format!(
                r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.1}" fill="{}" text-anchor="middle">{:.0}%</text>"#,
                lx,
                ly + font_size / 3.0,
                escape_xml(&style.font_family),
                font_size * 0.9,
                style.label_fill,
                fraction * 100.0
            ));
        }
        angle += sweep;
    }

    let legend_x = cx + RADIUS + LEGEND_GAP;
    let row_height = (font_size * 1.6).max(SWATCH + 6.0);
    let legend_height = row_height * chart.slices.len() as f32;
    let legend_top = cy - legend_height / 2.0;
    let mut legend_width: f32 = 0.0;

    for (i, slice) in chart.slices.iter().enumerate() {
        let text = if chart.show_data {
            format!("{} [{}]", slice.label, format_value(slice.value))
        } else {
            slice.label.clone()
        };
        let (text_w, _) = measure.measure_text(&text, font_size, false);
        legend_width = legend_width.max(SWATCH + 8.0 + text_w);

        let y = legend_top + row_height * i as f32;
        svg.push_str(&format!(
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}" />"#,
            legend_x,
            y + (row_height - SWATCH) / 2.0,
            SWATCH,
            SWATCH,
            PALETTE[i % PALETTE.len()]
        ));
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.1}" fill="{}">{}</text>"#,
            legend_x + SWATCH + 8.0,
            y + row_height / 2.0 + font_size / 3.0,
            escape_xml(&style.font_family),
            font_size,
            style.node_text,
            escape_xml(&text)
        ));
    }

    let mut width = legend_x + legend_width + padding;
    if let Some(title) = &chart.title {
        let (title_w, _) = measure.measure_text(title, font_size * 1.2, true);
        width = width.max(title_w + padding * 2.0);
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.1}" font-weight="bold" fill="{}" text-anchor="middle">{}</text>"#,
            width / 2.0,
            padding + font_size * 1.2,
            escape_xml(&style.font_family),
            font_size * 1.2,
            style.node_text,
            escape_xml(title)
        ));
    }

    let chart_bottom = cy + RADIUS;
    let legend_bottom = legend_top + legend_height;
    let height = chart_bottom.max(legend_bottom) + padding;
    (svg, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::ApproxTextMeasure;

    fn draw(source: &str) -> String {
        let chart = PieChart::parse(source).expect("pie parses");
        render(&chart, &DiagramStyle::default(), &mut ApproxTextMeasure, 20.0).0
    }

    #[test]
    fn parses_normalized_source() {
        let chart =
            PieChart::parse("pie showData\n    title Pets\n    \"Dogs\": 386\n    \"Cats\": 85")
                .expect("pie");
        assert!(chart.show_data);
        assert_eq!(chart.title.as_deref(), Some("Pets"));
        assert_eq!(
            chart.slices,
            vec![
                Slice {
                    label: "Dogs".into(),
                    value: 386.0
                },
                Slice {
                    label: "Cats".into(),
                    value: 85.0
                },
            ]
        );
    }

    #[test]
    fn title_on_header_line() {
        let chart = PieChart::parse("pie title Budget\n\"Rent\": 1").expect("pie");
        assert!(!chart.show_data);
        assert_eq!(chart.title.as_deref(), Some("Budget"));
    }

    #[test]
    fn labels_may_contain_colons() {
        let chart = PieChart::parse("pie\n\"a:b\": 2.5").expect("pie");
        assert_eq!(chart.slices[0].label, "a:b");
        assert_eq!(chart.slices[0].value, 2.5);
    }

    #[test]
    fn rejects_bad_values_and_empty_charts() {
        assert!(matches!(
            PieChart::parse("pie\n\"a\": lots"),
            Err(DiagramError::Parse(_))
        ));
        assert!(matches!(
            PieChart::parse("pie\n\"a\": -1"),
            Err(DiagramError::Parse(_))
        ));
        assert!(matches!(
            PieChart::parse("pie title Nothing"),
            Err(DiagramError::Parse(_))
        ));
    }

    #[test]
    fn show_data_puts_values_in_legend() {
        let svg = draw("pie showData\n\"Dogs\": 3\n\"Cats\": 1.5");
        assert!(svg.contains("Dogs [3]"));
        assert!(svg.contains("Cats [1.5]"));
        assert!(svg.contains(">67%<"));
        assert!(svg.contains(">33%<"));
        assert_eq!(svg.matches("<path").count(), 2);
    }

    #[test]
    fn single_slice_is_a_full_circle() {
        let svg = draw("pie\n\"All\": 10");
        assert!(svg.contains("<circle"));
        assert!(!svg.contains("<path"));
        assert!(!svg.contains("[10]"));
    }

    #[test]
    fn labels_are_escaped() {
        let svg = draw("pie title <b>\n\"a&b\": 1\n\"c\": 1");
        assert!(svg.contains("a&amp;b"));
        assert!(svg.contains("&lt;b&gt;"));
    }
}
