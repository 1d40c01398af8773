//! Per-layer change notifications.

use crate::layers::{Layer, LayerId};
use std::collections::HashMap;

/// What a committed write did to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Change {
    LayerInserted(LayerId),
    LayerUpdated(LayerId),
    LayerErased(LayerId),
    OrderChanged,
}

impl Change {
    /// The layer this change concerns, if any.
    pub fn layer_id(&self) -> Option<&LayerId> {
        match self {
            Change::LayerInserted(id) | Change::LayerUpdated(id) | Change::LayerErased(id) => Some(id),
            Change::OrderChanged => None,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked once per change after each commit.
pub type Subscriber = Box<dyn FnMut(&Change)>;

/// Collects changes during a transaction and delivers them on commit.
#[derive(Default)]
pub struct ChangeHub {
    pending: Vec<Change>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, change: Change) {
        if !self.pending.contains(&change) {
            self.pending.push(change);
        }
    }

    pub fn extend(&mut self, changes: impl IntoIterator<Item = Change>) {
        for change in changes {
            self.record(change);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Deliver pending changes to every subscriber.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let changes = std::mem::take(&mut self.pending);
        for (_, subscriber) in &mut self.subscribers {
            for change in &changes {
                subscriber(change);
            }
        }
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }
}

impl std::fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHub")
            .field("pending", &self.pending)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Full contents of a store: the layer map plus the order list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub layers: HashMap<LayerId, Layer>,
    pub order: Vec<LayerId>,
}

/// Changes that turn `before` into `after`.
///
/// Used where writes arrive in bulk (undo, redo, remote imports) and individual
/// operations are not visible.
pub fn diff_states(before: &StoreState, after: &StoreState) -> Vec<Change> {
    let mut changes = Vec::new();

    let mut ids: Vec<&LayerId> = before.layers.keys().chain(after.layers.keys()).collect();
    ids.sort();
    ids.dedup();

    for id in ids {
        match (before.layers.get(id), after.layers.get(id)) {
            (None, Some(_)) => changes.push(Change::LayerInserted(id.clone())),
            (Some(_), None) => changes.push(Change::LayerErased(id.clone())),
            (Some(a), Some(b)) if a != b => changes.push(Change::LayerUpdated(id.clone())),
            _ => {}
        }
    }

    if before.order != after.order {
        changes.push(Change::OrderChanged);
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Rectangle, Rgb};
    use kurbo::Point;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn rect(x: f64) -> Layer {
        Layer::Rectangle(Rectangle::new(Point::new(x, 0.0), 50.0, 50.0, Rgb::new(0, 0, 0)))
    }

    #[test]
    fn test_flush_dedups_and_delivers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let mut hub = ChangeHub::new();
        hub.subscribe(Box::new(move |c| sink.borrow_mut().push(c.clone())));

        let id = LayerId::from("a");
        hub.record(Change::LayerUpdated(id.clone()));
        hub.record(Change::LayerUpdated(id.clone()));
        hub.record(Change::OrderChanged);
        hub.flush();

        assert_eq!(*seen.borrow(), vec![Change::LayerUpdated(id), Change::OrderChanged]);
        assert!(!hub.has_pending());
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();

        let mut hub = ChangeHub::new();
        let sub = hub.subscribe(Box::new(move |_| *sink.borrow_mut() += 1));
        assert!(hub.unsubscribe(sub));
        assert!(!hub.unsubscribe(sub));

        hub.record(Change::OrderChanged);
        hub.flush();
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn test_diff_states() {
        let a = LayerId::from("a");
        let b = LayerId::from("b");
        let c = LayerId::from("c");

        let mut before = StoreState::default();
        before.layers.insert(a.clone(), rect(0.0));
        before.layers.insert(b.clone(), rect(10.0));
        before.order = vec![a.clone(), b.clone()];

        let mut after = StoreState::default();
        after.layers.insert(a.clone(), rect(5.0));
        after.layers.insert(c.clone(), rect(20.0));
        after.order = vec![a.clone(), c.clone()];

        let changes = diff_states(&before, &after);
        assert_eq!(
            changes,
            vec![
                Change::LayerUpdated(a),
                Change::LayerErased(b),
                Change::LayerInserted(c),
                Change::OrderChanged,
            ]
        );
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let state = StoreState::default();
        assert!(diff_states(&state, &state).is_empty());
    }
}
