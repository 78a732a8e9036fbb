use std::num::NonZeroUsize;

use latex2mathml::{DisplayStyle, latex_to_mathml};
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::MathError;

const DEFAULT_CACHE_CAPACITY: usize = 256;
const INLINE_PARSE_ERROR: &str = "[PARSE ERROR";

/// Typesets a formula. `display` selects block layout over inline.
pub trait MathEngine: Send + Sync {
    fn render(&self, source: &str, display: bool) -> Result<String, MathError>;
}

/// LaTeX to MathML, memoized per (formula, mode).
///
/// Live previews re-render the same formulas on every keystroke, so
/// conversions are kept in a bounded LRU.
pub struct MathMlEngine {
    cache: Mutex<LruCache<(String, bool), String>>,
}

impl MathMlEngine {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        MathMlEngine {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for MathMlEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MathEngine for MathMlEngine {
    fn render(&self, source: &str, display: bool) -> Result<String, MathError> {
        let key = (source.to_string(), display);
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit.clone());
        }

        let style = if display {
            DisplayStyle::Block
        } else {
            DisplayStyle::Inline
        };
        let mathml =
            latex_to_mathml(source, style).map_err(|e| MathError::Parse(format!("{:?}", e)))?;
        // latex2mathml reports some malformed input inline rather than as an Err.
        if let Some(at) = mathml.find(INLINE_PARSE_ERROR) {
            let detail = mathml[at + 1..].split(']').next().unwrap_or_default();
            return Err(MathError::Parse(detail.to_string()));
        }

        self.cache.lock().put(key, mathml.clone());
        Ok(mathml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_inline_modes_differ() {
        let engine = MathMlEngine::new();
        let block = engine.render("1+1=2", true).expect("block math");
        let inline = engine.render("1+1=2", false).expect("inline math");
        assert!(block.starts_with("<math"));
        assert!(block.contains("display=\"block\""));
        assert_ne!(block, inline);
    }

    #[test]
    fn results_are_cached_per_mode() {
        let engine = MathMlEngine::with_capacity(2);
        engine.render("a^2", true).expect("first");
        engine.render("a^2", true).expect("cached");
        engine.render("a^2", false).expect("inline");
        assert_eq!(engine.cached(), 2);
    }

    #[test]
    fn unbalanced_group_is_a_parse_error() {
        let engine = MathMlEngine::new();
        assert!(matches!(engine.render("x^{2", true), Err(MathError::Parse(_))));
        assert_eq!(engine.cached(), 0);
    }

    #[test]
    fn inline_error_markers_are_parse_errors() {
        let engine = MathMlEngine::new();
        for source in ["\\frac", "\\frac{a}", "a^", "\\sqrt"] {
            let result = engine.render(source, false);
            assert!(
                matches!(result, Err(MathError::Parse(_))),
                "{} rendered as {:?}",
                source,
                result
            );
        }
        assert_eq!(engine.cached(), 0);
    }
}
