use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::style::{BaseStyle, StyleOptions};

pub const DEFAULT_CODE_THEME: &str = "github";

/// Layered renderer configuration: document base, per-block and per-inline styles.
///
/// Every field is optional in configuration files. Rendering only ever reads
/// from a `RendererOptions`; per-element adjustments are made on copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererOptions {
    pub base: BaseStyle,
    pub block: BlockStyles,
    pub inline: InlineStyles,
    pub code_theme: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStyles {
    pub h1: StyleOptions,
    pub h2: StyleOptions,
    pub h3: StyleOptions,
    pub h4: StyleOptions,
    pub h5: StyleOptions,
    pub h6: StyleOptions,
    #[serde(alias = "paragraph")]
    pub p: StyleOptions,
    pub blockquote: StyleOptions,
    #[serde(alias = "list")]
    pub ul: StyleOptions,
    #[serde(alias = "ordered_list")]
    pub ol: StyleOptions,
    pub image: StyleOptions,
    #[serde(alias = "code_block")]
    pub code_pre: StyleOptions,
    #[serde(alias = "math_block")]
    pub latex: StyleOptions,
    #[serde(alias = "diagram_block")]
    pub mermaid: StyleOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineStyles {
    pub strong: StyleOptions,
    #[serde(alias = "emphasis")]
    pub em: StyleOptions,
    pub link: StyleOptions,
    #[serde(alias = "code_span")]
    pub codespan: StyleOptions,
    #[serde(alias = "strikethrough")]
    pub del: StyleOptions,
    #[serde(alias = "list_item")]
    pub listitem: StyleOptions,
    pub footnote: StyleOptions,
}

impl BlockStyles {
    /// Heading style by depth; depths past 6 share the h6 style.
    pub fn heading(&self, depth: u8) -> &StyleOptions {
        match depth {
            0 | 1 => &self.h1,
            2 => &self.h2,
            3 => &self.h3,
            4 => &self.h4,
            5 => &self.h5,
            _ => &self.h6,
        }
    }

    pub fn overlay(&self, o: &BlockStyles) -> BlockStyles {
        BlockStyles {
            h1: self.h1.overlay(&o.h1),
            h2: self.h2.overlay(&o.h2),
            h3: self.h3.overlay(&o.h3),
            h4: self.h4.overlay(&o.h4),
            h5: self.h5.overlay(&o.h5),
            h6: self.h6.overlay(&o.h6),
            p: self.p.overlay(&o.p),
            blockquote: self.blockquote.overlay(&o.blockquote),
            ul: self.ul.overlay(&o.ul),
            ol: self.ol.overlay(&o.ol),
            image: self.image.overlay(&o.image),
            code_pre: self.code_pre.overlay(&o.code_pre),
            latex: self.latex.overlay(&o.latex),
            mermaid: self.mermaid.overlay(&o.mermaid),
        }
    }
}

impl InlineStyles {
    pub fn overlay(&self, o: &InlineStyles) -> InlineStyles {
        InlineStyles {
            strong: self.strong.overlay(&o.strong),
            em: self.em.overlay(&o.em),
            link: self.link.overlay(&o.link),
            codespan: self.codespan.overlay(&o.codespan),
            del: self.del.overlay(&o.del),
            listitem: self.listitem.overlay(&o.listitem),
            footnote: self.footnote.overlay(&o.footnote),
        }
    }
}

impl RendererOptions {
    pub fn code_theme(&self) -> &str {
        self.code_theme
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_CODE_THEME)
    }

    /// Combines two option sets; anything set in `overrides` wins, key by key.
    pub fn overlay(&self, overrides: &RendererOptions) -> RendererOptions {
        RendererOptions {
            base: self.base.overlay(&overrides.base),
            block: self.block.overlay(&overrides.block),
            inline: self.inline.overlay(&overrides.inline),
            code_theme: overrides
                .code_theme
                .clone()
                .or_else(|| self.code_theme.clone()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Loads options from a file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let options = match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&content)?,
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::debug!(path = %path.display(), "loaded renderer options");
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{StyleValue, resolve_style};

    #[test]
    fn toml_options_keep_declaration_order() {
        let options = RendererOptions::from_toml_str(
            r##"
codeTheme = "solarized-dark"

[base]
color = "#333"
lineHeight = 1.75

[block.h1]
fontSize = 24
color = "#16a34a"
marginBottom = "1em"

[inline.strong]
color = "#dc2626"
"##,
        )
        .expect("toml options");

        assert_eq!(options.code_theme(), "solarized-dark");
        assert_eq!(options.base.color, Some(StyleValue::from("#333")));
        assert_eq!(
            resolve_style(&options.block.h1),
            "font-size: 24px;color: #16a34a;margin-bottom: 1em"
        );
        assert!(options.block.p.is_empty());
    }

    #[test]
    fn yaml_and_json_use_the_same_keys() {
        let yaml = RendererOptions::from_yaml_str(
            "block:\n  code_pre:\n    padding: 16\ninline:\n  codespan:\n    color: red\n",
        )
        .expect("yaml options");
        let json = RendererOptions::from_json_str(
            r#"{"block": {"code_pre": {"padding": 16}}, "inline": {"codespan": {"color": "red"}}}"#,
        )
        .expect("json options");

        assert_eq!(yaml, json);
        assert_eq!(resolve_style(&json.block.code_pre), "padding: 16px");
    }

    #[test]
    fn descriptive_aliases_are_accepted() {
        let options = RendererOptions::from_json_str(
            r#"{"block": {"paragraph": {"margin": "1em 0"}, "math_block": {"fontSize": 18}}}"#,
        )
        .expect("aliased keys");
        assert_eq!(resolve_style(&options.block.p), "margin: 1em 0");
        assert_eq!(resolve_style(&options.block.latex), "font-size: 18px");
    }

    #[test]
    fn code_theme_defaults_to_github() {
        assert_eq!(RendererOptions::default().code_theme(), DEFAULT_CODE_THEME);
    }

    #[test]
    fn overlay_merges_key_by_key_without_touching_inputs() {
        let base = RendererOptions::from_json_str(
            r##"{"base": {"color": "#111"}, "block": {"h1": {"fontSize": 24, "color": "#222"}}}"##,
        )
        .expect("base options");
        let overrides = RendererOptions::from_json_str(
            r##"{"base": {"padding": "8px"}, "block": {"h1": {"color": "#f00"}}, "codeTheme": "mocha"}"##,
        )
        .expect("override options");

        let merged = base.overlay(&overrides);
        assert_eq!(resolve_style(&merged.block.h1), "font-size: 24px;color: #f00");
        assert_eq!(merged.base.color, Some(StyleValue::from("#111")));
        assert_eq!(merged.base.padding, Some(StyleValue::from("8px")));
        assert_eq!(merged.code_theme(), "mocha");
        assert_eq!(resolve_style(&base.block.h1), "font-size: 24px;color: #222");
    }

    #[test]
    fn unsupported_extension_is_reported() {
        let dir = std::env::temp_dir().join("mdpress-options-test");
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("options.ini");
        std::fs::write(&path, "x = 1").expect("write temp file");

        let err = RendererOptions::load(&path).expect_err("ini is not supported");
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn heading_depth_past_six_uses_h6() {
        let mut block = BlockStyles::default();
        block.h6.set("color", "red");
        assert_eq!(block.heading(9).get("color"), Some(&StyleValue::from("red")));
    }
}
