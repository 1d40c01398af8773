//! Loro-backed implementation of the layer backend.

use super::changes::{Change, ChangeHub, StoreState, Subscriber, SubscriptionId, diff_states};
use super::convert::{layer_from_loro, layer_to_loro, patch_to_loro};
use super::{BackendError, BackendResult, LayerBackend};
use crate::config::CanvasConfig;
use crate::layers::{Layer, LayerId, LayerPatch};
use loro::{CommitOptions, Container, ExportMode, LoroDoc, LoroList, LoroMap, LoroValue, UndoManager, ValueOrContainer, VersionVector};
use std::collections::HashMap;

/// Key for the layers map in the document.
pub const LAYERS_KEY: &str = "layers";
/// Key for the order list in the document.
pub const ORDER_KEY: &str = "order";
/// Commit origin for writes the undo manager must not record.
const UNTRACKED_ORIGIN: &str = "collabink:untracked";

/// A layer store replicated through a `LoroDoc`.
///
/// Root containers are created lazily by Loro on first access, so a fresh
/// document reads as an empty canvas. Undo and redo only touch this peer's own
/// operations.
pub struct LoroBackend {
    /// The underlying Loro document.
    doc: LoroDoc,
    /// Undo manager for local undo/redo.
    undo_manager: UndoManager,
    hub: ChangeHub,
    grouping: bool,
}

impl LoroBackend {
    /// Create a new empty document.
    pub fn new(config: &CanvasConfig) -> Self {
        Self::from_doc(LoroDoc::new(), config)
    }

    /// Create a backend from a snapshot exported by another peer.
    pub fn from_snapshot(bytes: &[u8], config: &CanvasConfig) -> BackendResult<Self> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        Ok(Self::from_doc(doc, config))
    }

    fn from_doc(doc: LoroDoc, config: &CanvasConfig) -> Self {
        let mut undo_manager = UndoManager::new(&doc);
        undo_manager.set_max_undo_steps(config.max_undo_steps);
        undo_manager.set_merge_interval(config.history_merge_interval_ms);
        undo_manager.add_exclude_origin_prefix(UNTRACKED_ORIGIN);
        Self {
            doc,
            undo_manager,
            hub: ChangeHub::new(),
            grouping: false,
        }
    }

    /// Get the underlying LoroDoc.
    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    pub fn peer_id(&self) -> u64 {
        self.doc.peer_id()
    }

    fn layers_map(&self) -> LoroMap {
        self.doc.get_map(LAYERS_KEY)
    }

    fn order_list(&self) -> LoroList {
        self.doc.get_list(ORDER_KEY)
    }

    fn layer_container(&self, id: &LayerId) -> Option<LoroMap> {
        match self.layers_map().get(id.as_str())? {
            ValueOrContainer::Container(Container::Map(map)) => Some(map),
            _ => None,
        }
    }

    /// Read the whole store, skipping records that fail to convert.
    pub fn state(&self) -> StoreState {
        let mut layers = HashMap::new();
        if let LoroValue::Map(map) = self.layers_map().get_deep_value() {
            for (key, value) in map.iter() {
                let LoroValue::Map(record) = value else {
                    continue;
                };
                match layer_from_loro(record) {
                    Ok(layer) => {
                        layers.insert(LayerId::from(key.as_str()), layer);
                    }
                    Err(e) => log::warn!("Skipping layer {key}: {e}"),
                }
            }
        }
        StoreState {
            layers,
            order: self.order(),
        }
    }

    /// Export the document as a snapshot (full state).
    pub fn export_snapshot(&self) -> BackendResult<Vec<u8>> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| BackendError::Export(e.to_string()))
    }

    /// Export incremental updates since a version.
    pub fn export_updates(&self, since: &VersionVector) -> BackendResult<Vec<u8>> {
        self.doc
            .export(ExportMode::updates(since))
            .map_err(|e| BackendError::Export(e.to_string()))
    }

    /// Get the current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Merge updates from another peer and notify subscribers of what changed.
    pub fn import(&mut self, bytes: &[u8]) -> BackendResult<()> {
        self.doc.commit();
        let before = self.state();
        self.doc.import(bytes)?;
        let after = self.state();
        let changes = diff_states(&before, &after);
        log::debug!("Imported {} bytes, {} changes", bytes.len(), changes.len());
        self.hub.extend(changes);
        self.hub.flush();
        Ok(())
    }

    fn apply_history<F>(&mut self, step: F) -> BackendResult<bool>
    where
        F: FnOnce(&mut UndoManager) -> loro::LoroResult<bool>,
    {
        self.commit();
        if self.grouping {
            self.resume_history();
        }
        let before = self.state();
        let applied = step(&mut self.undo_manager)?;
        if applied {
            let after = self.state();
            self.hub.extend(diff_states(&before, &after));
            self.hub.flush();
        }
        Ok(applied)
    }
}

impl LayerBackend for LoroBackend {
    fn layer(&self, id: &LayerId) -> Option<Layer> {
        let map = self.layer_container(id)?;
        let LoroValue::Map(record) = map.get_deep_value() else {
            return None;
        };
        match layer_from_loro(&record) {
            Ok(layer) => Some(layer),
            Err(e) => {
                log::warn!("Layer {id} is unreadable: {e}");
                None
            }
        }
    }

    fn contains(&self, id: &LayerId) -> bool {
        self.layers_map().get(id.as_str()).is_some()
    }

    fn len(&self) -> usize {
        self.layers_map().len()
    }

    fn ids(&self) -> Vec<LayerId> {
        match self.layers_map().get_deep_value() {
            LoroValue::Map(map) => map.keys().map(|k| LayerId::from(k.as_str())).collect(),
            _ => Vec::new(),
        }
    }

    fn order(&self) -> Vec<LayerId> {
        let list = self.order_list();
        let mut result = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            if let Some(ValueOrContainer::Value(LoroValue::String(id))) = list.get(i) {
                result.push(LayerId::from(id.to_string()));
            }
        }
        result
    }

    fn insert(&mut self, id: &LayerId, layer: &Layer) -> BackendResult<()> {
        let map = self.layers_map().insert_container(id.as_str(), LoroMap::new())?;
        layer_to_loro(layer, &map)?;
        self.hub.record(Change::LayerInserted(id.clone()));
        Ok(())
    }

    fn update(&mut self, id: &LayerId, patch: &LayerPatch) -> BackendResult<bool> {
        let Some(kind) = self.layer(id).map(|l| l.kind()) else {
            return Ok(false);
        };
        let Some(map) = self.layer_container(id) else {
            return Ok(false);
        };
        patch_to_loro(patch, kind, &map)?;
        self.hub.record(Change::LayerUpdated(id.clone()));
        Ok(true)
    }

    fn remove(&mut self, id: &LayerId) -> BackendResult<bool> {
        if !self.contains(id) {
            return Ok(false);
        }
        self.layers_map().delete(id.as_str())?;
        self.hub.record(Change::LayerErased(id.clone()));
        Ok(true)
    }

    fn order_insert(&mut self, index: usize, id: &LayerId) -> BackendResult<()> {
        self.order_list().insert(index, LoroValue::String(id.to_string().into()))?;
        self.hub.record(Change::OrderChanged);
        Ok(())
    }

    fn order_remove(&mut self, index: usize) -> BackendResult<()> {
        self.order_list().delete(index, 1)?;
        self.hub.record(Change::OrderChanged);
        Ok(())
    }

    fn commit(&mut self) {
        self.doc.commit();
        self.hub.flush();
    }

    fn commit_untracked(&mut self) {
        self.doc.commit_with(CommitOptions::new().origin(UNTRACKED_ORIGIN));
        self.hub.flush();
    }

    fn pause_history(&mut self) -> BackendResult<()> {
        if self.grouping {
            return Ok(());
        }
        self.commit();
        self.undo_manager.group_start()?;
        self.grouping = true;
        Ok(())
    }

    fn resume_history(&mut self) {
        if !self.grouping {
            return;
        }
        self.commit();
        self.undo_manager.group_end();
        self.grouping = false;
    }

    fn undo(&mut self) -> BackendResult<bool> {
        let undone = self.apply_history(|um| um.undo())?;
        if undone {
            log::info!("Undo applied");
        }
        Ok(undone)
    }

    fn redo(&mut self) -> BackendResult<bool> {
        let redone = self.apply_history(|um| um.redo())?;
        if redone {
            log::info!("Redo applied");
        }
        Ok(redone)
    }

    fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.hub.subscribe(subscriber)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }
}

impl Default for LoroBackend {
    fn default() -> Self {
        Self::new(&CanvasConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Rectangle, Rgb};
    use kurbo::Point;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn rect(x: f64, y: f64) -> Layer {
        Layer::Rectangle(Rectangle::new(Point::new(x, y), 100.0, 100.0, Rgb::new(252, 142, 42)))
    }

    fn add(backend: &mut LoroBackend, id: &str, layer: &Layer) -> LayerId {
        let id = LayerId::from(id);
        backend.insert(&id, layer).unwrap();
        let len = backend.order().len();
        backend.order_insert(len, &id).unwrap();
        backend.commit();
        id
    }

    #[test]
    fn test_fresh_document_is_empty() {
        let backend = LoroBackend::default();
        assert!(backend.is_empty());
        assert!(backend.order().is_empty());
        assert!(!backend.can_undo());
    }

    #[test]
    fn test_insert_and_read() {
        let mut backend = LoroBackend::default();
        let id = add(&mut backend, "a", &rect(150.0, 100.0));
        assert_eq!(backend.layer(&id), Some(rect(150.0, 100.0)));
        assert_eq!(backend.order(), vec![id.clone()]);
        assert_eq!(backend.ids(), vec![id]);
    }

    #[test]
    fn test_update_unknown_is_noop() {
        let mut backend = LoroBackend::default();
        let updated = backend.update(&LayerId::from("nope"), &LayerPatch::fill(Rgb::new(0, 0, 0))).unwrap();
        assert!(!updated);
        assert!(!backend.remove(&LayerId::from("nope")).unwrap());
    }

    #[test]
    fn test_undo_redo_insert() {
        let mut backend = LoroBackend::default();
        let id = add(&mut backend, "a", &rect(0.0, 0.0));
        assert!(backend.can_undo());

        assert!(backend.undo().unwrap());
        assert!(!backend.contains(&id));
        assert!(backend.order().is_empty());

        assert!(backend.redo().unwrap());
        assert!(backend.contains(&id));
        assert_eq!(backend.order(), vec![id]);
    }

    #[test]
    fn test_paused_history_is_one_step() {
        let mut backend = LoroBackend::default();
        let id = add(&mut backend, "a", &rect(0.0, 0.0));

        backend.pause_history().unwrap();
        for step in 1..=5 {
            backend.update(&id, &LayerPatch::position(Point::new(step as f64 * 10.0, 0.0))).unwrap();
            backend.commit();
        }
        backend.resume_history();
        assert_eq!(backend.layer(&id).unwrap().position(), Point::new(50.0, 0.0));

        assert!(backend.undo().unwrap());
        assert_eq!(backend.layer(&id).unwrap().position(), Point::new(0.0, 0.0));
    }

    #[test]
    fn test_commit_notifies_subscribers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let mut backend = LoroBackend::default();
        backend.subscribe(Box::new(move |c| sink.borrow_mut().push(c.clone())));
        let id = add(&mut backend, "a", &rect(0.0, 0.0));

        assert_eq!(*seen.borrow(), vec![Change::LayerInserted(id), Change::OrderChanged]);
    }

    #[test]
    fn test_import_from_peer() {
        let mut alice = LoroBackend::default();
        let mut bob = LoroBackend::default();
        let id = add(&mut alice, "a", &rect(10.0, 20.0));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        bob.subscribe(Box::new(move |c| sink.borrow_mut().push(c.clone())));

        let bytes = alice.export_updates(&bob.version()).unwrap();
        bob.import(&bytes).unwrap();

        assert_eq!(bob.layer(&id), Some(rect(10.0, 20.0)));
        assert_eq!(*seen.borrow(), vec![Change::LayerInserted(id), Change::OrderChanged]);
        // Remote operations are not part of the local history.
        assert!(!bob.can_undo());
    }

    #[test]
    fn test_concurrent_field_writes_merge() {
        let mut alice = LoroBackend::default();
        let id = add(&mut alice, "a", &rect(0.0, 0.0));
        let snapshot = alice.export_snapshot().unwrap();
        let mut bob = LoroBackend::from_snapshot(&snapshot, &CanvasConfig::default()).unwrap();

        alice.update(&id, &LayerPatch::position(Point::new(30.0, 30.0))).unwrap();
        alice.commit();
        bob.update(&id, &LayerPatch::fill(Rgb::new(0, 0, 255))).unwrap();
        bob.commit();

        let from_alice = alice.export_snapshot().unwrap();
        let from_bob = bob.export_snapshot().unwrap();
        alice.import(&from_bob).unwrap();
        bob.import(&from_alice).unwrap();

        let merged = alice.layer(&id).unwrap();
        assert_eq!(merged, bob.layer(&id).unwrap());
        assert_eq!(merged.position(), Point::new(30.0, 30.0));
        assert_eq!(merged.fill(), Rgb::new(0, 0, 255));
    }
}
