//! Replicated store port and its adapters.
//!
//! Canvas logic talks to shared state only through [`LayerBackend`], so it runs the
//! same against a live Loro document or the in-memory adapter used in tests.
//!
//! # Schema
//!
//! The Loro document has the following structure:
//! ```text
//! LoroDoc
//! ├── "layers": LoroMap<LayerId, LoroMap> (layer fields)
//! └── "order": LoroList<String> (layer ids, back to front)
//! ```
//!
//! Each layer in "layers" is a LoroMap with:
//! - "type": String ("rectangle", "ellipse", "path", "text", "note", "diagram")
//! - "x", "y", "width", "height": f64
//! - "fill_r", "fill_g", "fill_b": i64
//! - Type-specific fields ("value", "spec", "points", "stroke_width")
//!
//! Every field is a separate map entry, so concurrent writes to different fields of
//! one layer merge, and writes to the same field resolve last-writer-wins.

mod changes;
mod convert;
mod memory;
mod schema;

pub use changes::{Change, ChangeHub, StoreState, Subscriber, SubscriptionId, diff_states};
pub use convert::{layer_from_loro, layer_to_loro, patch_to_loro};
pub use memory::MemoryBackend;
pub use schema::{LAYERS_KEY, LoroBackend, ORDER_KEY};

// Re-export Loro types that callers need for sync.
pub use loro::{ExportMode, VersionVector};

use crate::layers::{Layer, LayerId, LayerPatch};
use thiserror::Error;

/// Backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Loro error: {0}")]
    Loro(#[from] loro::LoroError),
    #[error("Export error: {0}")]
    Export(String),
    #[error("Malformed layer record: {0}")]
    Conversion(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Shared layer map, order list and undo history.
///
/// Writes are buffered into a transaction that `commit` closes. A committed
/// transaction is one undo step unless history is paused, in which case every
/// commit up to `resume_history` forms a single step.
pub trait LayerBackend {
    /// Read one layer.
    fn layer(&self, id: &LayerId) -> Option<Layer>;

    fn contains(&self, id: &LayerId) -> bool;

    /// Number of entries in the layer map.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the layer map, in no particular order.
    fn ids(&self) -> Vec<LayerId>;

    /// The order list, back to front.
    fn order(&self) -> Vec<LayerId>;

    /// Write a whole layer under `id`. Does not touch the order list.
    fn insert(&mut self, id: &LayerId, layer: &Layer) -> BackendResult<()>;

    /// Write only the fields set in `patch`. Returns false if `id` is unknown.
    fn update(&mut self, id: &LayerId, patch: &LayerPatch) -> BackendResult<bool>;

    /// Delete `id` from the layer map. Returns false if it was absent.
    fn remove(&mut self, id: &LayerId) -> BackendResult<bool>;

    /// Insert `id` into the order list at `index`.
    fn order_insert(&mut self, index: usize, id: &LayerId) -> BackendResult<()>;

    /// Remove the order list entry at `index`.
    fn order_remove(&mut self, index: usize) -> BackendResult<()>;

    /// Close the current transaction and notify subscribers.
    fn commit(&mut self);

    /// Commit the open transaction without recording an undo step.
    ///
    /// Used for store maintenance that is not a user action.
    fn commit_untracked(&mut self) {
        self.commit();
    }

    /// Start coalescing commits into one undo step.
    fn pause_history(&mut self) -> BackendResult<()>;

    /// Stop coalescing; the grouped commits become one undo step.
    fn resume_history(&mut self);

    fn undo(&mut self) -> BackendResult<bool>;

    fn redo(&mut self) -> BackendResult<bool>;

    fn can_undo(&self) -> bool;

    fn can_redo(&self) -> bool;

    fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}
