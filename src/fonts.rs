use std::collections::HashMap;

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, Weight};

#[derive(Hash, PartialEq, Eq, Clone)]
struct MeasureKey {
    text: String,
    font_size_bits: u32,
    is_bold: bool,
}

/// Width and height of a single line of label text, in pixels.
pub trait TextMeasure {
    fn measure_text(&mut self, text: &str, font_size: f32, is_bold: bool) -> (f32, f32);
}

/// Shapes text with the system's fonts.
pub struct CosmicTextMeasure {
    font_system: FontSystem,
    cache: HashMap<MeasureKey, (f32, f32)>,
}

impl CosmicTextMeasure {
    pub fn new() -> Self {
        Self {
            font_system: FontSystem::new(),
            cache: HashMap::new(),
        }
    }
}

impl Default for CosmicTextMeasure {
    fn default() -> Self {
        Self::new()
    }
}

impl TextMeasure for CosmicTextMeasure {
    fn measure_text(&mut self, text: &str, font_size: f32, is_bold: bool) -> (f32, f32) {
        let key = MeasureKey {
            text: text.to_string(),
            font_size_bits: font_size.to_bits(),
            is_bold,
        };
        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }

        let line_height = font_size * 1.2;
        let mut buffer = Buffer::new(
            &mut self.font_system,
            Metrics {
                font_size,
                line_height,
            },
        );
        buffer.set_size(&mut self.font_system, None, None);

        let attrs = Attrs::new().family(Family::SansSerif).weight(if is_bold {
            Weight::BOLD
        } else {
            Weight::NORMAL
        });
        buffer.set_text(&mut self.font_system, text, &attrs, Shaping::Advanced, None);

        let mut width: f32 = 0.0;
        let mut height: f32 = 0.0;
        for run in buffer.layout_runs() {
            width = width.max(run.line_w);
            height += run.line_height;
        }
        if height == 0.0 {
            height = line_height;
        }

        let measured = (width, height);
        self.cache.insert(key, measured);
        measured
    }
}

/// Font-free estimate: wide (CJK, emoji) characters take a full em,
/// everything else a little over half.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproxTextMeasure;

impl TextMeasure for ApproxTextMeasure {
    fn measure_text(&mut self, text: &str, font_size: f32, is_bold: bool) -> (f32, f32) {
        let ems: f32 = text
            .chars()
            .map(|c| if is_wide(c) { 1.0 } else { 0.55 })
            .sum();
        let weight = if is_bold { 1.05 } else { 1.0 };
        (ems * font_size * weight, font_size * 1.2)
    }
}

fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x1F300..=0x1FAFF
        | 0x20000..=0x3FFFD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_counts_cjk_as_full_width() {
        let mut measure = ApproxTextMeasure;
        let (latin, h) = measure.measure_text("ab", 10.0, false);
        let (cjk, _) = measure.measure_text("中文", 10.0, false);
        assert!((latin - 11.0).abs() < 1e-4);
        assert!((cjk - 20.0).abs() < 1e-4);
        assert!((h - 12.0).abs() < 1e-4);
    }

    #[test]
    fn bold_is_wider() {
        let mut measure = ApproxTextMeasure;
        let (regular, _) = measure.measure_text("label", 14.0, false);
        let (bold, _) = measure.measure_text("label", 14.0, true);
        assert!(bold > regular);
    }
}
