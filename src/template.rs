use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TemplateError};
use crate::options::RendererOptions;

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("default", include_str!("../templates/default.toml")),
    ("xiaogang", include_str!("../templates/xiaogang.toml")),
    ("elegant", include_str!("../templates/elegant.toml")),
    ("creative", include_str!("../templates/creative.toml")),
    ("smartisan", include_str!("../templates/smartisan.toml")),
    ("simple-global", include_str!("../templates/simple-global.toml")),
];

fn default_wrapper_tag() -> String {
    "section".to_string()
}

/// A named options bundle with an optional container around the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: RendererOptions,
    #[serde(default)]
    pub wrapper: Option<Wrapper>,
}

/// Element the rendered fragment is placed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wrapper {
    #[serde(default = "default_wrapper_tag")]
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

impl Template {
    pub fn from_builtin(name: &str) -> Result<Self, TemplateError> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        let content = BUILTIN_TEMPLATES
            .iter()
            .find(|(id, _)| *id == normalized)
            .map(|(_, content)| *content)
            .ok_or_else(|| TemplateError::Unknown {
                name: name.to_string(),
                available: Self::list_builtins().join(", "),
            })?;
        toml::from_str(content).map_err(|source| TemplateError::Parse {
            name: normalized,
            source,
        })
    }

    pub fn list_builtins() -> Vec<&'static str> {
        BUILTIN_TEMPLATES.iter().map(|(id, _)| *id).collect()
    }

    pub fn builtins() -> Result<Vec<Self>, TemplateError> {
        Self::list_builtins()
            .into_iter()
            .map(Self::from_builtin)
            .collect()
    }

    /// Parses a user-supplied template in the same format as the built-ins.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Places `html` inside the template's wrapper, if it has one.
    pub fn apply(&self, html: &str) -> String {
        let Some(wrapper) = &self.wrapper else {
            return html.to_string();
        };
        let tag = if !wrapper.tag.is_empty() && wrapper.tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            wrapper.tag.as_str()
        } else {
            "section"
        };

        let mut open = format!("<{}", tag);
        if let Some(id) = wrapper.id.as_deref().filter(|id| !id.is_empty()) {
            open.push_str(&format!(
                " id=\"{}\"",
                html_escape::encode_double_quoted_attribute(id)
            ));
        }
        if let Some(style) = wrapper.style.as_deref().filter(|s| !s.is_empty()) {
            open.push_str(&format!(
                " style=\"{}\"",
                html_escape::encode_double_quoted_attribute(style)
            ));
        }
        format!("{}>{}</{}>", open, html, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{StyleValue, resolve_style};

    #[test]
    fn every_builtin_parses() {
        let templates = Template::builtins().expect("built-in templates parse");
        assert_eq!(templates.len(), Template::list_builtins().len());
        for template in &templates {
            assert!(!template.name.is_empty());
            assert_eq!(
                Template::list_builtins()
                    .iter()
                    .filter(|id| **id == template.id)
                    .count(),
                1
            );
        }
    }

    #[test]
    fn from_builtin_accepts_underscores_and_case() {
        let hyphen = Template::from_builtin("simple-global").expect("hyphen variant");
        let underscore = Template::from_builtin("Simple_Global").expect("underscore variant");
        assert_eq!(hyphen, underscore);
        assert_eq!(hyphen.options.base.color, Some(StyleValue::from("#333333")));
    }

    #[test]
    fn unknown_template_lists_alternatives() {
        let err = Template::from_builtin("nope").expect_err("unknown template");
        let message = err.to_string();
        assert!(message.contains("nope"));
        assert!(message.contains("smartisan"));
    }

    #[test]
    fn builtin_styles_keep_file_order() {
        let template = Template::from_builtin("xiaogang").expect("xiaogang");
        assert_eq!(
            resolve_style(&template.options.block.h1),
            "font-size: 17px;background: linear-gradient(45deg, #4299e1, #667eea);\
             -webkit-background-clip: text;-webkit-text-fill-color: transparent;\
             margin: 24px 0 16px;font-weight: bold"
        );
    }

    #[test]
    fn smartisan_wraps_output() {
        let template = Template::from_builtin("smartisan").expect("smartisan");
        let html = template.apply("<p>x</p>");
        assert!(html.starts_with("<section id=\"nice\" style=\"margin: 0; padding: 10px 20px;"));
        assert!(html.ends_with("<p>x</p></section>"));
    }

    #[test]
    fn templates_without_wrapper_pass_through() {
        let template = Template::from_builtin("default").expect("default");
        assert_eq!(template.apply("<p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn user_templates_parse_from_toml() {
        let template = Template::from_toml_str(
            "id = \"mine\"\nname = \"Mine\"\n[wrapper]\ntag = \"div\"\n[options.block.p]\ncolor = \"red\"\n",
        )
        .expect("user template");
        assert_eq!(template.apply("x"), "<div>x</div>");
        assert_eq!(resolve_style(&template.options.block.p), "color: red");
    }
}
