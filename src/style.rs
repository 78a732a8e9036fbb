//! Inline CSS resolution.
//!
//! Style maps come from configuration as camel-case property names
//! (`fontSize`, `WebkitBackgroundClip`) and are serialized to the
//! `property: value` form that goes into a `style` attribute.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Number(f64),
    Text(String),
}

impl StyleValue {
    /// Mirrors the truthiness test used when deciding whether a property is set.
    pub fn is_set(&self) -> bool {
        match self {
            StyleValue::Number(n) => *n != 0.0 && !n.is_nan(),
            StyleValue::Text(s) => !s.trim().is_empty(),
        }
    }
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleValue::Number(n) => write!(f, "{}", n),
            StyleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for StyleValue {
    fn from(value: &str) -> Self {
        StyleValue::Text(value.to_string())
    }
}

impl From<String> for StyleValue {
    fn from(value: String) -> Self {
        StyleValue::Text(value)
    }
}

impl From<f64> for StyleValue {
    fn from(value: f64) -> Self {
        StyleValue::Number(value)
    }
}

impl From<i32> for StyleValue {
    fn from(value: i32) -> Self {
        StyleValue::Number(f64::from(value))
    }
}

/// Property map in configuration order. `None` entries come from explicit
/// `null`s and are skipped on output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StyleRepr")]
pub struct StyleOptions(IndexMap<String, Option<StyleValue>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum StyleRepr {
    Map(IndexMap<String, StyleEntry>),
    Css(String),
}

/// `@media` blocks hold nested style objects; they are accepted and dropped.
#[derive(Deserialize)]
#[serde(untagged)]
enum StyleEntry {
    Value(Option<StyleValue>),
    Nested(serde::de::IgnoredAny),
}

impl TryFrom<StyleRepr> for StyleOptions {
    type Error = String;

    fn try_from(repr: StyleRepr) -> Result<Self, Self::Error> {
        match repr {
            StyleRepr::Map(map) => {
                let mut properties = IndexMap::with_capacity(map.len());
                for (key, entry) in map {
                    match entry {
                        StyleEntry::Value(value) => {
                            properties.insert(key, value);
                        }
                        StyleEntry::Nested(_) if key.starts_with("@media") => {}
                        StyleEntry::Nested(_) => {
                            return Err(format!(
                                "style property `{}` must be a string or a number",
                                key
                            ));
                        }
                    }
                }
                Ok(StyleOptions(properties))
            }
            StyleRepr::Css(css) => Ok(StyleOptions::from_css(&css)),
        }
    }
}

impl StyleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `property: value; …` declaration list. Keys are kept as written.
    pub fn from_css(css: &str) -> Self {
        css.split(';')
            .filter_map(|decl| {
                let (key, value) = decl.split_once(':')?;
                let key = key.trim();
                let value = value.trim();
                (!key.is_empty() && !value.is_empty()).then(|| (key, value))
            })
            .map(|(key, value)| (key.to_string(), Some(StyleValue::from(value))))
            .collect::<IndexMap<_, _>>()
            .into()
    }

    pub fn with(mut self, key: &str, value: impl Into<StyleValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Inserts or replaces a property. Replacing keeps the original position.
    pub fn set(&mut self, key: &str, value: impl Into<StyleValue>) {
        self.0.insert(key.to_string(), Some(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&StyleValue> {
        self.0.get(key).and_then(Option::as_ref)
    }

    /// True when `key` holds a non-empty, non-zero value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some_and(StyleValue::is_set)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StyleValue)> {
        self.0
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Returns a copy where every property present in `overrides` wins.
    pub fn overlay(&self, overrides: &StyleOptions) -> StyleOptions {
        let mut merged = self.clone();
        for (key, value) in &overrides.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl From<IndexMap<String, Option<StyleValue>>> for StyleOptions {
    fn from(map: IndexMap<String, Option<StyleValue>>) -> Self {
        StyleOptions(map)
    }
}

impl<K: Into<String>, V: Into<StyleValue>> FromIterator<(K, V)> for StyleOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        StyleOptions(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// Document-level settings. Only a fixed subset reaches the root container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BaseStyle {
    pub theme_color: Option<StyleValue>,
    pub font_family: Option<StyleValue>,
    pub text_align: Option<StyleValue>,
    pub line_height: Option<StyleValue>,
    pub font_size: Option<StyleValue>,
    pub color: Option<StyleValue>,
    pub background: Option<StyleValue>,
    pub padding: Option<StyleValue>,
    pub margin: Option<StyleValue>,
    pub word_break: Option<StyleValue>,
    pub white_space: Option<StyleValue>,
}

impl BaseStyle {
    /// The global text color, if one is configured.
    pub fn color(&self) -> Option<&StyleValue> {
        self.color.as_ref().filter(|c| c.is_set())
    }

    /// Returns a copy where every field set in `overrides` wins.
    pub fn overlay(&self, overrides: &BaseStyle) -> BaseStyle {
        fn pick(base: &Option<StyleValue>, over: &Option<StyleValue>) -> Option<StyleValue> {
            over.clone().or_else(|| base.clone())
        }

        BaseStyle {
            theme_color: pick(&self.theme_color, &overrides.theme_color),
            font_family: pick(&self.font_family, &overrides.font_family),
            text_align: pick(&self.text_align, &overrides.text_align),
            line_height: pick(&self.line_height, &overrides.line_height),
            font_size: pick(&self.font_size, &overrides.font_size),
            color: pick(&self.color, &overrides.color),
            background: pick(&self.background, &overrides.background),
            padding: pick(&self.padding, &overrides.padding),
            margin: pick(&self.margin, &overrides.margin),
            word_break: pick(&self.word_break, &overrides.word_break),
            white_space: pick(&self.white_space, &overrides.white_space),
        }
    }
}

/// `fontSize` -> `font-size`, `WebkitTextFillColor` -> `-webkit-text-fill-color`.
pub fn hyphenate(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Serializes a style map to an inline declaration list.
///
/// Numbers get a `px` unit except for line-height. Media-query keys are
/// dropped since inline styles cannot express them. Output order is the
/// map's insertion order.
pub fn resolve_style(style: &StyleOptions) -> String {
    style
        .iter()
        .filter(|(key, _)| !key.starts_with("@media"))
        .map(|(key, value)| {
            let property = hyphenate(key);
            match value {
                StyleValue::Number(n) if !property.contains("line-height") => {
                    format!("{}: {}px", property, n)
                }
                _ => format!("{}: {}", property, value),
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Serializes the root container style.
///
/// The order is fixed, and the global color carries `!important` so it
/// beats inherited colors that nested elements would otherwise pick up.
pub fn resolve_base_style(base: &BaseStyle) -> String {
    let declarations: [(&str, &Option<StyleValue>, &str); 11] = [
        ("line-height", &base.line_height, ""),
        ("font-size", &base.font_size, ""),
        ("text-align", &base.text_align, ""),
        ("--theme-color", &base.theme_color, ""),
        ("color", &base.color, " !important"),
        ("background", &base.background, ""),
        ("padding", &base.padding, ""),
        ("font-family", &base.font_family, ""),
        ("margin", &base.margin, ""),
        ("word-break", &base.word_break, ""),
        ("white-space", &base.white_space, ""),
    ];

    declarations
        .iter()
        .filter_map(|(property, value, suffix)| {
            let value = value.as_ref().filter(|v| v.is_set())?;
            Some(format!("{}: {}{}", property, value, suffix))
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Applies the global text color to an element style that has none.
///
/// The shared configuration is never touched: the style is borrowed when
/// nothing changes and copied when the color has to be filled in.
pub fn cascade_color<'a>(style: &'a StyleOptions, base: &BaseStyle) -> Cow<'a, StyleOptions> {
    match base.color() {
        Some(color) if !style.has("color") => {
            let mut owned = style.clone();
            owned.set("color", color.clone());
            Cow::Owned(owned)
        }
        _ => Cow::Borrowed(style),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn numbers_get_px_except_line_height() {
        let style = StyleOptions::new()
            .with("fontSize", 15)
            .with("lineHeight", 1.75);
        assert_eq!(resolve_style(&style), "font-size: 15px;line-height: 1.75");
    }

    #[test]
    fn strings_are_emitted_verbatim() {
        let style = StyleOptions::new()
            .with("background", "linear-gradient(45deg, #4299e1, #667eea)")
            .with("WebkitBackgroundClip", "text");
        assert_eq!(
            resolve_style(&style),
            "background: linear-gradient(45deg, #4299e1, #667eea);-webkit-background-clip: text"
        );
    }

    #[test]
    fn media_queries_and_nulls_are_dropped() {
        let style: StyleOptions = serde_json::from_str(
            r##"{"color": "#333", "@media (max-width: 768px)": "x", "margin": null}"##,
        )
        .expect("style json");
        assert_eq!(resolve_style(&style), "color: #333");
    }

    #[test]
    fn nested_media_blocks_are_accepted_and_dropped() {
        let style: StyleOptions = serde_json::from_str(
            r#"{"color": "red", "@media (max-width: 768px)": {"fontSize": 14}}"#,
        )
        .expect("nested media json");
        assert_eq!(resolve_style(&style), "color: red");

        let style: StyleOptions = toml::from_str(
            "fontSize = 15\n[\"@media (max-width: 768px)\"]\nfontSize = 14\n",
        )
        .expect("nested media toml");
        assert_eq!(resolve_style(&style), "font-size: 15px");
    }

    #[test]
    fn nested_objects_outside_media_are_rejected() {
        let err = serde_json::from_str::<StyleOptions>(r#"{"color": {"light": "red"}}"#)
            .expect_err("nested color");
        assert!(err.to_string().contains("`color`"));
    }

    #[test]
    fn empty_style_resolves_to_empty_string() {
        assert_eq!(resolve_style(&StyleOptions::new()), "");
    }

    #[test]
    fn css_strings_deserialize_into_style_maps() {
        let style: StyleOptions =
            serde_json::from_str(r#""font-size: 20px; color: red;""#).expect("css string");
        assert_eq!(style.get("color"), Some(&StyleValue::from("red")));
        assert_eq!(resolve_style(&style), "font-size: 20px;color: red");
    }

    #[test]
    fn base_style_uses_fixed_order_and_important_color() {
        let base = BaseStyle {
            padding: Some("1rem".into()),
            color: Some("#333".into()),
            line_height: Some("1.75".into()),
            theme_color: Some("#16a34a".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_base_style(&base),
            "line-height: 1.75;--theme-color: #16a34a;color: #333 !important;padding: 1rem"
        );
    }

    #[test]
    fn base_style_skips_empty_values() {
        let base = BaseStyle {
            color: Some("".into()),
            ..Default::default()
        };
        assert_eq!(resolve_base_style(&base), "");
    }

    #[test]
    fn cascade_borrows_when_color_is_present() {
        let style = StyleOptions::new().with("color", "#ffffff");
        let base = BaseStyle {
            color: Some("#112233".into()),
            ..Default::default()
        };
        let resolved = cascade_color(&style, &base);
        assert!(matches!(resolved, Cow::Borrowed(_)));
        assert_eq!(resolve_style(&resolved), "color: #ffffff");
    }

    #[test]
    fn cascade_copies_and_leaves_input_untouched() {
        let style = StyleOptions::new().with("margin", "1em 0");
        let base = BaseStyle {
            color: Some("#112233".into()),
            ..Default::default()
        };
        let resolved = cascade_color(&style, &base);
        assert_eq!(resolve_style(&resolved), "margin: 1em 0;color: #112233");
        assert!(!style.has("color"));
    }

    fn camel_key() -> impl Strategy<Value = String> {
        "[a-z]{1,6}([A-Z][a-z]{1,6}){0,3}"
    }

    fn css_value() -> impl Strategy<Value = String> {
        "[a-z0-9#(),%.-]([a-z0-9 #(),%.-]{0,10}[a-z0-9#(),%.-])?"
    }

    fn style_value() -> impl Strategy<Value = StyleValue> {
        prop_oneof![
            (0u32..500).prop_map(|n| StyleValue::Number(f64::from(n))),
            css_value().prop_map(StyleValue::Text),
        ]
    }

    proptest! {
        #[test]
        fn resolution_is_stable(entries in prop::collection::vec((camel_key(), style_value()), 0..8)) {
            let style: StyleOptions = entries.into_iter().collect();
            prop_assert_eq!(resolve_style(&style), resolve_style(&style.clone()));
        }

        #[test]
        fn resolving_parsed_output_is_a_no_op(entries in prop::collection::vec((camel_key(), style_value()), 0..8)) {
            let style: StyleOptions = entries.into_iter().collect();
            let once = resolve_style(&style);
            let twice = resolve_style(&StyleOptions::from_css(&once));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn numeric_values_carry_px(key in camel_key(), n in 1u32..500) {
            let style = StyleOptions::new().with(&key, f64::from(n));
            let css = resolve_style(&style);
            let property = hyphenate(&key);
            if property.contains("line-height") {
                prop_assert_eq!(css, format!("{}: {}", property, n));
            } else {
                prop_assert_eq!(css, format!("{}: {}px", property, n));
            }
        }
    }
}
