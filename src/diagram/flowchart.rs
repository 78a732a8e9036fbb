use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::DiagramError;
use crate::fonts::TextMeasure;

use super::{DiagramStyle, escape_xml};

const NODE_PADDING_H: f32 = 18.0;
const NODE_PADDING_V: f32 = 12.0;
const MIN_NODE_WIDTH: f32 = 60.0;
const RANK_SPACING: f32 = 56.0;
const NODE_SPACING: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TopDown,
    BottomUp,
    LeftRight,
    RightLeft,
}

impl Direction {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "TD" | "TB" => Some(Direction::TopDown),
            "BT" => Some(Direction::BottomUp),
            "LR" => Some(Direction::LeftRight),
            "RL" => Some(Direction::RightLeft),
            _ => None,
        }
    }

    fn is_vertical(self) -> bool {
        matches!(self, Direction::TopDown | Direction::BottomUp)
    }

    fn is_reversed(self) -> bool {
        matches!(self, Direction::BottomUp | Direction::RightLeft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Rect,
    Rounded,
    Stadium,
    Circle,
    Rhombus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStroke {
    Solid,
    Dotted,
    Thick,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub stroke: EdgeStroke,
    pub arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flowchart {
    pub direction: Direction,
    pub nodes: IndexMap<String, Node>,
    pub edges: Vec<Edge>,
}

/// Links in match order: longer forms first so `-.->` is not read as `-.-`.
const LINKS: &[(&str, EdgeStroke, bool)] = &[
    ("-.->", EdgeStroke::Dotted, true),
    ("-.-", EdgeStroke::Dotted, false),
    ("==>", EdgeStroke::Thick, true),
    ("===", EdgeStroke::Thick, false),
    ("-->", EdgeStroke::Solid, true),
    ("---", EdgeStroke::Solid, false),
];

/// Shape delimiters, two-character openers first.
const SHAPES: &[(&str, &str, NodeShape)] = &[
    ("((", "))", NodeShape::Circle),
    ("([", "])", NodeShape::Stadium),
    ("[", "]", NodeShape::Rect),
    ("(", ")", NodeShape::Rounded),
    ("{", "}", NodeShape::Rhombus),
];

const IGNORED_STATEMENTS: &[&str] = &[
    "subgraph", "end", "direction", "classDef", "class", "style", "linkStyle", "click",
];

impl Flowchart {
    pub fn parse(source: &str) -> Result<Self, DiagramError> {
        let mut lines = source
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("%%"));
        let header = lines.next().ok_or(DiagramError::Empty)?;
        let mut words = header.split_whitespace();
        match words.next() {
            Some("graph" | "flowchart") => {}
            _ => {
                return Err(DiagramError::Parse(format!(
                    "not a flowchart: '{}'",
                    header
                )));
            }
        }
        let direction = match words.next() {
            None => Direction::TopDown,
            Some(token) => Direction::parse(token.trim_end_matches(';')).ok_or_else(|| {
                DiagramError::Parse(format!("unknown flowchart direction '{}'", token))
            })?,
        };

        let mut chart = Flowchart {
            direction,
            nodes: IndexMap::new(),
            edges: Vec::new(),
        };
        for line in lines {
            for statement in line.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                let keyword = statement.split_whitespace().next().unwrap_or_default();
                if IGNORED_STATEMENTS.contains(&keyword) {
                    tracing::debug!(statement, "skipping flowchart statement");
                    continue;
                }
                chart.parse_statement(statement)?;
            }
        }
        Ok(chart)
    }

    fn parse_statement(&mut self, statement: &str) -> Result<(), DiagramError> {
        let (first, mut rest) = parse_node(statement)?;
        let mut prev = self.add_node(first);
        rest = rest.trim_start();

        while !rest.is_empty() {
            let (stroke, arrow, after) = parse_link(rest).ok_or_else(|| {
                DiagramError::Parse(format!("expected a link in '{}'", statement))
            })?;
            rest = after.trim_start();

            let mut label = None;
            if let Some(after_bar) = rest.strip_prefix('|') {
                let end = after_bar.find('|').ok_or_else(|| {
                    DiagramError::Parse(format!("unclosed edge label in '{}'", statement))
                })?;
                label = Some(unquote(after_bar[..end].trim()).to_string()).filter(|l| !l.is_empty());
                rest = after_bar[end + 1..].trim_start();
            }

            let (node, after) = parse_node(rest)?;
            let next = self.add_node(node);
            self.edges.push(Edge {
                from: prev,
                to: next.clone(),
                label,
                stroke,
                arrow,
            });
            prev = next;
            rest = after.trim_start();
        }
        Ok(())
    }

    /// Registers a node reference. A bare reference never overwrites a
    /// label given elsewhere.
    fn add_node(&mut self, (node, explicit): (Node, bool)) -> String {
        let id = node.id.clone();
        match self.nodes.get_mut(&id) {
            Some(existing) if explicit => *existing = node,
            Some(_) => {}
            None => {
                self.nodes.insert(id.clone(), node);
            }
        }
        id
    }
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

fn parse_link(input: &str) -> Option<(EdgeStroke, bool, &str)> {
    LINKS.iter().find_map(|(pattern, stroke, arrow)| {
        input.strip_prefix(pattern).map(|rest| {
            // Extra dashes or equals only lengthen the link.
            let rest = rest.trim_start_matches(['-', '=']);
            match rest.strip_prefix('>') {
                Some(rest) => (*stroke, true, rest),
                None => (*stroke, *arrow, rest),
            }
        })
    })
}

/// Reads `id` optionally followed by a shaped label. The flag is true
/// when the shape was written out.
fn parse_node(input: &str) -> Result<((Node, bool), &str), DiagramError> {
    let id_len = input
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(input.len(), |(i, _)| i);
    if id_len == 0 {
        return Err(DiagramError::Parse(format!(
            "expected a node id at '{}'",
            input
        )));
    }
    let id = &input[..id_len];
    let rest = &input[id_len..];

    for (open, close, shape) in SHAPES {
        let Some(body) = rest.strip_prefix(open) else {
            continue;
        };
        let end = body.find(close).ok_or_else(|| {
            DiagramError::Parse(format!("unclosed '{}' after node '{}'", open, id))
        })?;
        let label = unquote(body[..end].trim());
        let node = Node {
            id: id.to_string(),
            label: (if label.is_empty() { id } else { label }).to_string(),
            shape: *shape,
        };
        return Ok(((node, true), &body[end + close.len()..]));
    }

    let node = Node {
        id: id.to_string(),
        label: id.to_string(),
        shape: NodeShape::Rect,
    };
    Ok(((node, false), rest))
}

#[derive(Debug, Clone, Copy)]
struct Placed {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl Placed {
    fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Longest-path ranks over the graph with back edges ignored.
fn assign_ranks(chart: &Flowchart) -> Vec<usize> {
    let n = chart.nodes.len();
    let index = |id: &str| chart.nodes.get_index_of(id);
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in &chart.edges {
        if let (Some(from), Some(to)) = (index(&edge.from), index(&edge.to)) {
            if from != to {
                successors[from].push(to);
            }
        }
    }

    // 0 = unvisited, 1 = on the DFS stack, 2 = finished.
    let mut state = vec![0u8; n];
    let mut forward: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut order = Vec::with_capacity(n);
    for root in 0..n {
        if state[root] != 0 {
            continue;
        }
        let mut stack = vec![(root, 0usize)];
        state[root] = 1;
        while let Some((node, next)) = stack.pop() {
            if let Some(&succ) = successors[node].get(next) {
                stack.push((node, next + 1));
                match state[succ] {
                    0 => {
                        forward[node].push(succ);
                        state[succ] = 1;
                        stack.push((succ, 0));
                    }
                    2 => forward[node].push(succ),
                    _ => {}
                }
            } else {
                state[node] = 2;
                order.push(node);
            }
        }
    }

    let mut ranks = vec![0usize; n];
    for &node in order.iter().rev() {
        for &succ in &forward[node] {
            ranks[succ] = ranks[succ].max(ranks[node] + 1);
        }
    }
    ranks
}

fn node_size<M: TextMeasure + ?Sized>(node: &Node, font_size: f32, measure: &mut M) -> (f32, f32) {
    let (text_w, text_h) = node
        .label
        .lines()
        .map(|line| measure.measure_text(line, font_size, false))
        .fold((0.0f32, 0.0f32), |(w, h), (lw, lh)| (w.max(lw), h + lh));
    let width = (text_w + NODE_PADDING_H * 2.0).max(MIN_NODE_WIDTH);
    let height = text_h.max(font_size * 1.2) + NODE_PADDING_V * 2.0;
    match node.shape {
        NodeShape::Circle => {
            let d = width.max(height);
            (d, d)
        }
        NodeShape::Rhombus => (width * 1.4, height * 1.4),
        _ => (width, height),
    }
}

fn layout<M: TextMeasure + ?Sized>(
    chart: &Flowchart,
    font_size: f32,
    measure: &mut M,
    padding: f32,
) -> (Vec<Placed>, f32, f32) {
    let ranks = assign_ranks(chart);
    let sizes: Vec<(f32, f32)> = chart
        .nodes
        .values()
        .map(|node| node_size(node, font_size, &mut *measure))
        .collect();
    let vertical = chart.direction.is_vertical();
    // (main, cross): main runs along the flow.
    let extent = |i: usize| {
        let (w, h) = sizes[i];
        if vertical { (h, w) } else { (w, h) }
    };

    let rank_count = ranks.iter().copied().max().map_or(0, |r| r + 1);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
    for (i, &rank) in ranks.iter().enumerate() {
        layers[rank].push(i);
    }

    // One barycenter sweep keeps children under their parents.
    let mut slot = vec![0.0f32; ranks.len()];
    for layer in &mut layers {
        for (pos, &i) in layer.iter().enumerate() {
            slot[i] = pos as f32;
        }
    }
    for r in 1..layers.len() {
        let mut keyed: Vec<(f32, usize)> = layers[r]
            .iter()
            .map(|&i| {
                let parents: Vec<f32> = chart
                    .edges
                    .iter()
                    .filter(|e| chart.nodes.get_index_of(&e.to) == Some(i))
                    .filter_map(|e| chart.nodes.get_index_of(&e.from))
                    .filter(|&p| ranks[p] < r)
                    .map(|p| slot[p])
                    .collect();
                let key = if parents.is_empty() {
                    slot[i]
                } else {
                    parents.iter().sum::<f32>() / parents.len() as f32
                };
                (key, i)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        layers[r] = keyed.into_iter().map(|(_, i)| i).collect();
        for (pos, &i) in layers[r].iter().enumerate() {
            slot[i] = pos as f32;
        }
    }

    let layer_main: Vec<f32> = layers
        .iter()
        .map(|layer| layer.iter().map(|&i| extent(i).0).fold(0.0, f32::max))
        .collect();
    let layer_cross: Vec<f32> = layers
        .iter()
        .map(|layer| {
            let sum: f32 = layer.iter().map(|&i| extent(i).1).sum();
            sum + NODE_SPACING * layer.len().saturating_sub(1) as f32
        })
        .collect();
    let total_cross = layer_cross.iter().copied().fold(0.0, f32::max);
    let total_main =
        layer_main.iter().sum::<f32>() + RANK_SPACING * layers.len().saturating_sub(1) as f32;

    let mut placed = vec![
        Placed {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        };
        ranks.len()
    ];
    let mut main_offset = 0.0;
    for (r, layer) in layers.iter().enumerate() {
        let mut cross_offset = (total_cross - layer_cross[r]) / 2.0;
        for &i in layer {
            let (main_size, cross_size) = extent(i);
            let mut main = main_offset + (layer_main[r] - main_size) / 2.0;
            if chart.direction.is_reversed() {
                main = total_main - main - main_size;
            }
            let (width, height) = sizes[i];
            placed[i] = if vertical {
                Placed {
                    x: padding + cross_offset,
                    y: padding + main,
                    width,
                    height,
                }
            } else {
                Placed {
                    x: padding + main,
                    y: padding + cross_offset,
                    width,
                    height,
                }
            };
            cross_offset += cross_size + NODE_SPACING;
        }
        main_offset += layer_main[r] + RANK_SPACING;
    }

    let (width, height) = if vertical {
        (total_cross, total_main)
    } else {
        (total_main, total_cross)
    };
    (placed, width + padding * 2.0, height + padding * 2.0)
}

pub(super) fn render<M: TextMeasure + ?Sized>(
    chart: &Flowchart,
    style: &DiagramStyle,
    measure: &mut M,
    padding: f32,
) -> (String, f32, f32) {
    let (placed, width, height) = layout(chart, style.font_size, &mut *measure, padding);
    let positions: HashMap<&str, Placed> = chart
        .nodes
        .keys()
        .map(String::as_str)
        .zip(placed.iter().copied())
        .collect();

    let mut svg = String::new();
    // Edges go first so nodes paint over their ends.
    for edge in &chart.edges {
        if let (Some(from), Some(to)) = (
            positions.get(edge.from.as_str()),
            positions.get(edge.to.as_str()),
        ) {
            svg.push_str(&render_edge(edge, from, to, style, chart.direction, &mut *measure));
        }
    }
    for (node, pos) in chart.nodes.values().zip(&placed) {
        svg.push_str(&render_node(node, pos, style));
    }
    (svg, width, height)
}

fn render_node(node: &Node, pos: &Placed, style: &DiagramStyle) -> String {
    let mut svg = String::new();
    match node.shape {
        NodeShape::Rect => svg.push_str(&format!(
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}" stroke="{}" stroke-width="1.5" />"#,
            pos.x, pos.y, pos.width, pos.height, style.node_fill, style.node_stroke
        )),
        NodeShape::Rounded | NodeShape::Stadium => {
            let rx = if node.shape == NodeShape::Stadium {
                pos.height / 2.0
            } else {
                8.0_f32.min(pos.height / 4.0)
            };
            svg.push_str(&format!(
                r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" rx="{:.2}" fill="{}" stroke="{}" stroke-width="1.5" />"#,
                pos.x, pos.y, pos.width, pos.height, rx, style.node_fill, style.node_stroke
            ));
        }
        NodeShape::Circle => {
            let (cx, cy) = pos.center();
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" stroke="{}" stroke-width="1.5" />"#,
                cx,
                cy,
                pos.width.min(pos.height) / 2.0,
                style.node_fill,
                style.node_stroke
            ));
        }
        NodeShape::Rhombus => {
            let (cx, cy) = pos.center();
            svg.push_str(&format!(
                r#"<polygon points="{:.2},{:.2} {:.2},{:.2} {:.2},{:.2} {:.2},{:.2}" fill="{}" stroke="{}" stroke-width="1.5" />"#,
                cx, pos.y,
                pos.x + pos.width, cy,
                cx, pos.y + pos.height,
                pos.x, cy,
                style.node_fill, style.node_stroke
            ));
        }
    }

    let lines: Vec<&str> = node.label.lines().collect();
    let line_height = style.font_size * 1.2;
    let (cx, cy) = pos.center();
    let start_y = cy - line_height * (lines.len() as f32 - 1.0) / 2.0 + style.font_size / 3.0;
    for (i, line) in lines.iter().enumerate() {
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.1}" fill="{}" text-anchor="middle">{}</text>"#,
            cx,
            start_y + i as f32 * line_height,
            escape_xml(&style.font_family),
            style.font_size,
            style.node_text,
            escape_xml(line)
        ));
    }
    svg
}

fn render_edge<M: TextMeasure + ?Sized>(
    edge: &Edge,
    from: &Placed,
    to: &Placed,
    style: &DiagramStyle,
    direction: Direction,
    measure: &mut M,
) -> String {
    let mut svg = String::new();
    let (dash_attr, stroke_width) = match edge.stroke {
        EdgeStroke::Solid => ("", 1.5),
        EdgeStroke::Dotted => (r#" stroke-dasharray="4,4""#, 1.5),
        EdgeStroke::Thick => ("", 3.0),
    };

    let (x1, y1, x2, y2, label_x, label_y) = if edge.from == edge.to {
        // Self loop off the node's right side.
        let x = from.x + from.width;
        let (top, bottom) = (from.y + from.height * 0.3, from.y + from.height * 0.7);
        let bulge = 30.0;
        svg.push_str(&format!(
            r#"<path d="M {:.2} {:.2} C {:.2} {:.2}, {:.2} {:.2}, {:.2} {:.2}" fill="none" stroke="{}" stroke-width="{:.1}"{} />"#,
            x, top, x + bulge, top - bulge / 2.0, x + bulge, bottom + bulge / 2.0, x, bottom,
            style.edge_stroke, stroke_width, dash_attr
        ));
        (x, top, x, bottom, x + bulge, (top + bottom) / 2.0)
    } else {
        let vertical = direction.is_vertical();
        let (x1, y1, x2, y2) = if vertical {
            let (fx, _) = from.center();
            let (tx, _) = to.center();
            if to.y > from.y {
                (fx, from.y + from.height, tx, to.y)
            } else {
                (fx, from.y, tx, to.y + to.height)
            }
        } else {
            let (_, fy) = from.center();
            let (_, ty) = to.center();
            if to.x > from.x {
                (from.x + from.width, fy, to.x, ty)
            } else {
                (from.x, fy, to.x + to.width, ty)
            }
        };

        if (x1 - x2).abs() < 1.0 || (y1 - y2).abs() < 1.0 {
            svg.push_str(&format!(
                r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="{:.1}"{} />"#,
                x1, y1, x2, y2, style.edge_stroke, stroke_width, dash_attr
            ));
        } else {
            let (mx, my) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
            let (cx1, cy1, cx2, cy2) = if vertical {
                (x1, my, x2, my)
            } else {
                (mx, y1, mx, y2)
            };
            svg.push_str(&format!(
                r#"<path d="M {:.2} {:.2} C {:.2} {:.2}, {:.2} {:.2}, {:.2} {:.2}" fill="none" stroke="{}" stroke-width="{:.1}"{} />"#,
                x1, y1, cx1, cy1, cx2, cy2, x2, y2, style.edge_stroke, stroke_width, dash_attr
            ));
        }
        (x1, y1, x2, y2, (x1 + x2) / 2.0, (y1 + y2) / 2.0)
    };

    if edge.arrow {
        let angle = if edge.from == edge.to {
            std::f32::consts::PI
        } else if direction.is_vertical() {
            if y2 > y1 { std::f32::consts::FRAC_PI_2 } else { -std::f32::consts::FRAC_PI_2 }
        } else if x2 > x1 {
            0.0
        } else {
            std::f32::consts::PI
        };
        svg.push_str(&render_arrow_head(x2, y2, angle, style));
    }

    if let Some(label) = &edge.label {
        let font_size = style.font_size * 0.85;
        let (text_w, text_h) = measure.measure_text(label, font_size, false);
        let (w, h) = (text_w + 8.0, text_h + 4.0);
        svg.push_str(&format!(
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" rx="2" fill="{}" />"#,
            label_x - w / 2.0,
            label_y - h / 2.0,
            w,
            h,
            style.label_fill
        ));
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.1}" fill="{}" text-anchor="middle">{}</text>"#,
            label_x,
            label_y + font_size / 3.0,
            escape_xml(&style.font_family),
            font_size,
            style.edge_text,
            escape_xml(label)
        ));
    }
    svg
}

fn render_arrow_head(x: f32, y: f32, angle: f32, style: &DiagramStyle) -> String {
    let cos = angle.cos();
    let sin = angle.sin();
    let p1 = (x - cos * 10.0 + sin * 5.0, y - sin * 10.0 - cos * 5.0);
    let p2 = (x - cos * 10.0 - sin * 5.0, y - sin * 10.0 + cos * 5.0);
    format!(
        r#"<polygon points="{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}" fill="{}" />"#,
        x, y, p1.0, p1.1, p2.0, p2.1, style.edge_stroke
    )
}
