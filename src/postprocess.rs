//! Replaces `.mermaid` placeholders in rendered HTML with diagram SVG.

use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;
use std::sync::OnceLock;

use futures::future::join_all;
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str, text};
use lru::LruCache;
use parking_lot::Mutex;

use crate::diagram::DiagramEngine;
use crate::error::PostProcessError;

const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Caller-owned state for one preview session: remembers whether the
/// diagram engine has been set up so it is only ever initialized once.
#[derive(Debug, Default)]
pub struct DiagramSession {
    init: OnceLock<Result<(), String>>,
}

impl DiagramSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.init.get(), Some(Ok(())))
    }

    /// Runs `engine.initialize()` on first use. Later calls return the
    /// remembered outcome.
    fn ensure<E: DiagramEngine>(&self, engine: &E) -> bool {
        let outcome = self.init.get_or_init(|| {
            engine.initialize().map_err(|e| {
                tracing::warn!(error = %e, "diagram engine failed to initialize");
                e.to_string()
            })
        });
        outcome.is_ok()
    }
}

#[derive(Debug, Default)]
struct Placeholder {
    source: String,
    done: bool,
}

/// Renders diagram placeholders left behind by the markdown renderer.
///
/// Safe to run repeatedly over the same document: placeholders that were
/// already filled in are left alone.
pub struct DiagramPostProcessor<E: DiagramEngine> {
    engine: E,
    cache: Mutex<LruCache<(String, String), String>>,
}

impl<E: DiagramEngine> DiagramPostProcessor<E> {
    pub fn new(engine: E) -> Self {
        Self::with_capacity(engine, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(engine: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            engine,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn process(
        &self,
        session: &DiagramSession,
        html: &str,
    ) -> Result<String, PostProcessError> {
        if !session.ensure(&self.engine) {
            return Ok(html.to_string());
        }

        let placeholders = collect_placeholders(html)?;
        let pending: Vec<(usize, String, String)> = placeholders
            .into_iter()
            .enumerate()
            .filter(|(_, p)| !p.done)
            .map(|(i, p)| {
                let source = html_escape::decode_html_entities(&p.source).trim().to_string();
                (i, format!("mdpress-diagram-{}", i), source)
            })
            .filter(|(_, _, source)| !source.is_empty())
            .collect();
        if pending.is_empty() {
            return Ok(html.to_string());
        }

        let results = join_all(pending.iter().map(|(_, id, source)| self.render_one(id, source))).await;

        let mut replacements: Vec<Option<String>> = Vec::new();
        for ((index, id, _), result) in pending.iter().zip(results) {
            if replacements.len() <= *index {
                replacements.resize(*index + 1, None);
            }
            replacements[*index] = Some(match result {
                Ok(svg) => svg,
                Err(message) => {
                    tracing::warn!(id = %id, error = %message, "diagram rendering failed");
                    format!(
                        r#"<div class="mermaid-error">Diagram rendering failed: {}</div>"#,
                        html_escape::encode_text(&message)
                    )
                }
            });
        }
        tracing::debug!(rendered = pending.len(), "diagram placeholders filled");

        fill_placeholders(html, &replacements)
    }

    async fn render_one(&self, id: &str, source: &str) -> Result<String, String> {
        let key = (id.to_string(), source.to_string());
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit.clone());
        }
        let svg = self
            .engine
            .render(id, source)
            .await
            .map_err(|e| e.to_string())?;
        self.cache.lock().put(key, svg.clone());
        Ok(svg)
    }
}

fn collect_placeholders(html: &str) -> Result<Vec<Placeholder>, PostProcessError> {
    let found: RefCell<Vec<Placeholder>> = RefCell::new(Vec::new());
    let mark_done = || {
        if let Some(last) = found.borrow_mut().last_mut() {
            last.done = true;
        }
    };

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(".mermaid", |el| {
                    found.borrow_mut().push(Placeholder {
                        source: String::new(),
                        done: el.has_attribute("data-processed"),
                    });
                    Ok(())
                }),
                element!(".mermaid svg", |_| {
                    mark_done();
                    Ok(())
                }),
                element!(".mermaid .mermaid-error", |_| {
                    mark_done();
                    Ok(())
                }),
                text!(".mermaid", |chunk| {
                    if let Some(last) = found.borrow_mut().last_mut() {
                        last.source.push_str(chunk.as_str());
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )?;
    Ok(found.into_inner())
}

fn fill_placeholders(html: &str, replacements: &[Option<String>]) -> Result<String, PostProcessError> {
    let index = Cell::new(0usize);
    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(".mermaid", |el| {
                let i = index.get();
                index.set(i + 1);
                if let Some(Some(content)) = replacements.get(i) {
                    el.set_inner_content(content, ContentType::Html);
                    el.set_attribute("data-processed", "true")?;
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )?;
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::executor::block_on;

    use crate::diagram::BuiltinDiagramEngine;
    use crate::error::DiagramError;

    #[derive(Default)]
    struct Recording {
        inits: AtomicUsize,
        renders: AtomicUsize,
        fail_init: bool,
    }

    impl DiagramEngine for Recording {
        fn initialize(&self) -> Result<(), DiagramError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                Err(DiagramError::Init("no fonts".into()))
            } else {
                Ok(())
            }
        }

        fn render(
            &self,
            id: &str,
            source: &str,
        ) -> impl Future<Output = Result<String, DiagramError>> + Send {
            self.renders.fetch_add(1, Ordering::SeqCst);
            let result = if source.starts_with("bad") {
                Err(DiagramError::Parse(format!("cannot read <{}>", source)))
            } else {
                Ok(format!("<svg id=\"{}\">{}</svg>", id, source.len()))
            };
            futures::future::ready(result)
        }
    }

    const DOC: &str = concat!(
        "<p>intro</p>",
        "<div class=\"mermaid\">graph TD\n    A --&gt; B</div>",
        "<div class=\"mermaid\">bad input</div>",
        "<div class=\"mermaid\">   </div>",
    );

    #[test]
    fn fills_each_placeholder_independently() {
        let processor = DiagramPostProcessor::new(Recording::default());
        let session = DiagramSession::new();
        let html = block_on(processor.process(&session, DOC)).expect("process");

        assert!(session.is_initialized());
        assert!(html.contains(
            "<div class=\"mermaid\" data-processed=\"true\"><svg id=\"mdpress-diagram-0\">20</svg></div>"
        ));
        assert!(html.contains(
            "<div class=\"mermaid-error\">Diagram rendering failed: diagram parse error: cannot read &lt;bad input&gt;</div>"
        ));
        assert!(html.contains("<div class=\"mermaid\">   </div>"));
        assert!(html.starts_with("<p>intro</p>"));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let processor = DiagramPostProcessor::new(Recording::default());
        let session = DiagramSession::new();
        let once = block_on(processor.process(&session, DOC)).expect("first pass");
        let twice = block_on(processor.process(&session, &once)).expect("second pass");

        assert_eq!(once, twice);
        assert_eq!(processor.engine().inits.load(Ordering::SeqCst), 1);
        assert_eq!(processor.engine().renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unchanged_diagrams_come_from_cache() {
        let processor = DiagramPostProcessor::new(Recording::default());
        let session = DiagramSession::new();
        let doc = "<div class=\"mermaid\">pie\n\"a\": 1</div>";
        let first = block_on(processor.process(&session, doc)).expect("first");
        let second = block_on(processor.process(&session, doc)).expect("second");

        assert_eq!(first, second);
        assert_eq!(processor.engine().renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_passes_share_session_and_cache() {
        let processor = DiagramPostProcessor::new(Recording::default());
        let session = DiagramSession::new();
        let first_doc = "<p>one</p><div class=\"mermaid\">pie\n\"a\": 1</div>";
        let second_doc = "<p>two</p><div class=\"mermaid\">pie\n\"a\": 1</div>";

        let (first, second) = block_on(async {
            futures::join!(
                processor.process(&session, first_doc),
                processor.process(&session, second_doc)
            )
        });
        let first = first.expect("first document");
        let second = second.expect("second document");

        let filled = "<div class=\"mermaid\" data-processed=\"true\"><svg id=\"mdpress-diagram-0\">10</svg></div>";
        assert_eq!(first, format!("<p>one</p>{}", filled));
        assert_eq!(second, format!("<p>two</p>{}", filled));
        assert_eq!(processor.engine().inits.load(Ordering::SeqCst), 1);
        assert!(processor.engine().renders.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn failed_initialization_leaves_html_untouched() {
        let processor = DiagramPostProcessor::new(Recording {
            fail_init: true,
            ..Recording::default()
        });
        let session = DiagramSession::new();
        let html = block_on(processor.process(&session, DOC)).expect("process");
        let again = block_on(processor.process(&session, DOC)).expect("process");

        assert_eq!(html, DOC);
        assert_eq!(again, DOC);
        assert!(!session.is_initialized());
        assert_eq!(processor.engine().inits.load(Ordering::SeqCst), 1);
        assert_eq!(processor.engine().renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn skips_marked_and_filled_placeholders() {
        let processor = DiagramPostProcessor::new(Recording::default());
        let session = DiagramSession::new();
        let doc = concat!(
            "<div class=\"mermaid\" data-processed=\"true\">pie</div>",
            "<div class=\"mermaid\"><svg></svg></div>",
            "<div class=\"mermaid\"><div class=\"mermaid-error\">x</div></div>",
        );
        let html = block_on(processor.process(&session, doc)).expect("process");

        assert_eq!(html, doc);
        assert_eq!(processor.engine().renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn builtin_engine_draws_real_svg() {
        let processor = DiagramPostProcessor::new(BuiltinDiagramEngine::new());
        let session = DiagramSession::new();
        let doc = "<div class=\"mermaid\">pie showData\n    \"Dogs\": 3\n    \"Cats\": 1</div>";
        let html = block_on(processor.process(&session, doc)).expect("process");

        assert!(html.contains("<svg xmlns=\"http://www.w3.org/2000/svg\" id=\"mdpress-diagram-0\""));
        assert!(html.contains("Dogs [3]"));
    }
}
