//! In-memory backend with a snapshot history.

use super::changes::{Change, ChangeHub, StoreState, Subscriber, SubscriptionId, diff_states};
use super::{BackendResult, LayerBackend};
use crate::layers::{Layer, LayerId, LayerPatch};

/// Undo depth used by `MemoryBackend::default`.
const DEFAULT_MAX_UNDO_STEPS: usize = 100;

/// In-memory layer store for testing and offline use.
///
/// History keeps whole-store snapshots: the state before each committed
/// transaction, or before a paused group, is one undo step.
#[derive(Debug)]
pub struct MemoryBackend {
    state: StoreState,
    /// State at the start of the open transaction.
    txn_base: Option<StoreState>,
    /// State when history was paused.
    group_base: Option<StoreState>,
    undo_stack: Vec<StoreState>,
    redo_stack: Vec<StoreState>,
    max_undo_steps: usize,
    hub: ChangeHub,
}

impl MemoryBackend {
    pub fn new(max_undo_steps: usize) -> Self {
        Self {
            state: StoreState::default(),
            txn_base: None,
            group_base: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_undo_steps,
            hub: ChangeHub::new(),
        }
    }

    /// Snapshot of the current contents.
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Capture the transaction base before the first write.
    fn begin_write(&mut self) {
        if self.group_base.is_none() && self.txn_base.is_none() {
            self.txn_base = Some(self.state.clone());
        }
    }

    fn push_undo(&mut self, base: StoreState) {
        if base == self.state {
            return;
        }
        self.undo_stack.push(base);
        // Clear redo stack when new changes are made
        self.redo_stack.clear();
        // Limit undo history size
        if self.undo_stack.len() > self.max_undo_steps {
            self.undo_stack.remove(0);
        }
    }

    fn restore(&mut self, target: StoreState) {
        let changes = diff_states(&self.state, &target);
        self.state = target;
        self.hub.extend(changes);
        self.hub.flush();
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_STEPS)
    }
}

impl LayerBackend for MemoryBackend {
    fn layer(&self, id: &LayerId) -> Option<Layer> {
        self.state.layers.get(id).cloned()
    }

    fn contains(&self, id: &LayerId) -> bool {
        self.state.layers.contains_key(id)
    }

    fn len(&self) -> usize {
        self.state.layers.len()
    }

    fn ids(&self) -> Vec<LayerId> {
        self.state.layers.keys().cloned().collect()
    }

    fn order(&self) -> Vec<LayerId> {
        self.state.order.clone()
    }

    fn insert(&mut self, id: &LayerId, layer: &Layer) -> BackendResult<()> {
        self.begin_write();
        self.state.layers.insert(id.clone(), layer.clone());
        self.hub.record(Change::LayerInserted(id.clone()));
        Ok(())
    }

    fn update(&mut self, id: &LayerId, patch: &LayerPatch) -> BackendResult<bool> {
        if !self.contains(id) {
            return Ok(false);
        }
        self.begin_write();
        if let Some(layer) = self.state.layers.get_mut(id) {
            layer.apply_patch(patch);
        }
        self.hub.record(Change::LayerUpdated(id.clone()));
        Ok(true)
    }

    fn remove(&mut self, id: &LayerId) -> BackendResult<bool> {
        if !self.contains(id) {
            return Ok(false);
        }
        self.begin_write();
        self.state.layers.remove(id);
        self.hub.record(Change::LayerErased(id.clone()));
        Ok(true)
    }

    fn order_insert(&mut self, index: usize, id: &LayerId) -> BackendResult<()> {
        self.begin_write();
        let index = index.min(self.state.order.len());
        self.state.order.insert(index, id.clone());
        self.hub.record(Change::OrderChanged);
        Ok(())
    }

    fn order_remove(&mut self, index: usize) -> BackendResult<()> {
        if index >= self.state.order.len() {
            return Ok(());
        }
        self.begin_write();
        self.state.order.remove(index);
        self.hub.record(Change::OrderChanged);
        Ok(())
    }

    fn commit(&mut self) {
        if let Some(base) = self.txn_base.take() {
            self.push_undo(base);
        }
        self.hub.flush();
    }

    fn commit_untracked(&mut self) {
        self.txn_base = None;
        self.hub.flush();
    }

    fn pause_history(&mut self) -> BackendResult<()> {
        if self.group_base.is_some() {
            return Ok(());
        }
        self.commit();
        self.group_base = Some(self.state.clone());
        Ok(())
    }

    fn resume_history(&mut self) {
        self.commit();
        if let Some(base) = self.group_base.take() {
            self.push_undo(base);
        }
    }

    fn undo(&mut self) -> BackendResult<bool> {
        self.resume_history();
        let Some(snapshot) = self.undo_stack.pop() else {
            return Ok(false);
        };
        // Save current state to redo stack
        self.redo_stack.push(self.state.clone());
        self.restore(snapshot);
        log::info!("Undo applied, {} steps left", self.undo_stack.len());
        Ok(true)
    }

    fn redo(&mut self) -> BackendResult<bool> {
        self.resume_history();
        let Some(snapshot) = self.redo_stack.pop() else {
            return Ok(false);
        };
        self.undo_stack.push(self.state.clone());
        self.restore(snapshot);
        log::info!("Redo applied");
        Ok(true)
    }

    fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.hub.subscribe(subscriber)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Ellipse, Rgb};
    use kurbo::Point;

    fn ellipse() -> Layer {
        Layer::Ellipse(Ellipse::new(Point::ZERO, 40.0, 40.0, Rgb::new(0, 0, 0)))
    }

    fn add(backend: &mut MemoryBackend, id: &str) -> LayerId {
        let id = LayerId::from(id);
        backend.insert(&id, &ellipse()).unwrap();
        let len = backend.order().len();
        backend.order_insert(len, &id).unwrap();
        backend.commit();
        id
    }

    #[test]
    fn test_each_commit_is_a_step() {
        let mut backend = MemoryBackend::default();
        add(&mut backend, "a");
        add(&mut backend, "b");
        assert_eq!(backend.undo_count(), 2);

        assert!(backend.undo().unwrap());
        assert_eq!(backend.order(), vec![LayerId::from("a")]);
        assert!(backend.redo().unwrap());
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_new_write_clears_redo() {
        let mut backend = MemoryBackend::default();
        add(&mut backend, "a");
        backend.undo().unwrap();
        assert!(backend.can_redo());

        add(&mut backend, "b");
        assert!(!backend.can_redo());
    }

    #[test]
    fn test_paused_group_is_one_step() {
        let mut backend = MemoryBackend::default();
        let id = add(&mut backend, "a");

        backend.pause_history().unwrap();
        for i in 1..=10 {
            backend.update(&id, &LayerPatch::position(Point::new(i as f64, 0.0))).unwrap();
            backend.commit();
        }
        backend.resume_history();
        assert_eq!(backend.undo_count(), 2);

        backend.undo().unwrap();
        assert_eq!(backend.layer(&id).unwrap().position(), Point::ZERO);
    }

    #[test]
    fn test_noop_commit_records_nothing() {
        let mut backend = MemoryBackend::default();
        backend.commit();
        backend.pause_history().unwrap();
        backend.resume_history();
        assert!(!backend.can_undo());
        assert!(!backend.undo().unwrap());
    }

    #[test]
    fn test_bounded_depth() {
        let mut backend = MemoryBackend::new(3);
        for i in 0..5 {
            add(&mut backend, &format!("l{i}"));
        }
        assert_eq!(backend.undo_count(), 3);
    }
}
