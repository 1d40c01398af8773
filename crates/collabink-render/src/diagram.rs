//! Diagram rendering adapter and the per-layer result cache.
//!
//! Diagram layers hold a text specification. An external adapter turns it into
//! drawable markup asynchronously; a failure stays scoped to its own layer.

use collabink_core::{Layer, LayerId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Diagram rendering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagramError {
    #[error("Empty diagram specification")]
    EmptySpec,
    #[error("Diagram syntax error: {0}")]
    Syntax(String),
    #[error("Diagram adapter error: {0}")]
    Adapter(String),
}

/// Boxed future for async adapter calls (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Turns a diagram specification into renderable markup.
pub trait DiagramAdapter {
    fn render<'a>(&'a self, spec: &'a str) -> BoxFuture<'a, Result<String, DiagramError>>;
}

/// Render state of one Diagram layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramState {
    Pending,
    Ready(String),
    Failed(DiagramError),
}

#[derive(Debug, Clone)]
struct Entry {
    spec: String,
    state: DiagramState,
}

/// Cached render results keyed by layer id.
///
/// A layer is re-rendered only when its specification changes.
#[derive(Debug, Default)]
pub struct DiagramCache {
    entries: HashMap<LayerId, Entry>,
}

impl DiagramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &LayerId) -> Option<&DiagramState> {
        self.entries.get(id).map(|entry| &entry.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` has no result for `spec` yet.
    pub fn needs_render(&self, id: &LayerId, spec: &str) -> bool {
        self.entries.get(id).is_none_or(|entry| entry.spec != spec)
    }

    /// Record that a render of `spec` has started.
    pub fn mark_pending(&mut self, id: LayerId, spec: &str) {
        self.entries.insert(
            id,
            Entry {
                spec: spec.to_string(),
                state: DiagramState::Pending,
            },
        );
    }

    /// Store a finished render. Results for a stale specification are dropped.
    pub fn store_result(&mut self, id: &LayerId, spec: &str, result: Result<String, DiagramError>) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if entry.spec != spec {
            log::debug!("Dropping stale diagram render for {id}");
            return;
        }
        entry.state = match result {
            Ok(markup) => DiagramState::Ready(markup),
            Err(e) => {
                log::warn!("Diagram {id} failed to render: {e}");
                DiagramState::Failed(e)
            }
        };
    }

    /// Render every Diagram layer whose specification changed and forget layers
    /// that no longer exist. Returns the number of renders performed.
    pub async fn refresh<A: DiagramAdapter + ?Sized>(&mut self, adapter: &A, layers: &[(LayerId, Layer)]) -> usize {
        let live: Vec<(&LayerId, &str)> = layers
            .iter()
            .filter_map(|(id, layer)| match layer {
                Layer::Diagram(diagram) => Some((id, diagram.spec.as_str())),
                _ => None,
            })
            .collect();
        self.entries.retain(|id, _| live.iter().any(|(live_id, _)| *live_id == id));

        let mut rendered = 0;
        for (id, spec) in live {
            if !self.needs_render(id, spec) {
                continue;
            }
            self.mark_pending(id.clone(), spec);
            let result = if spec.trim().is_empty() {
                Err(DiagramError::EmptySpec)
            } else {
                adapter.render(spec).await
            };
            self.store_result(id, spec, result);
            rendered += 1;
        }
        rendered
    }
}
