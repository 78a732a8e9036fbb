use std::path::PathBuf;

use thiserror::Error;

/// Failures loading renderer options from a file or string.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML options: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid YAML options: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported options file '{0}' (use .toml, .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template '{name}'. Available: {available}")]
    Unknown { name: String, available: String },
    #[error("template '{name}' is malformed: {source}")]
    Parse {
        name: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum MathError {
    #[error("LaTeX parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("empty diagram")]
    Empty,
    #[error("unsupported diagram type '{0}'")]
    Unsupported(String),
    #[error("diagram parse error: {0}")]
    Parse(String),
    #[error("diagram engine failed to initialize: {0}")]
    Init(String),
}

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("unknown highlight theme '{0}'")]
    UnknownTheme(String),
    #[error("no syntax definition for '{0}'")]
    UnknownLanguage(String),
    #[error("highlighting failed: {0}")]
    Syntect(String),
}

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("failed to rewrite rendered HTML: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),
}
