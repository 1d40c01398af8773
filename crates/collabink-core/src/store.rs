//! Layer store: insert, erase, reorder and transform layers through a backend.
//!
//! Every public mutation is one committed transaction, and so one undo step
//! unless the backend's history is paused.

use crate::config::{BoxSize, CanvasConfig};
use crate::crdt::{BackendResult, LayerBackend};
use crate::layers::{Diagram, Ellipse, Layer, LayerId, LayerKind, LayerPatch, Note, Path, Rectangle, Rgb, Text};
use crate::selection::net_selection;
use kurbo::{Point, Rect, Vec2};
use std::collections::HashSet;

/// The shared layer map and order list, seen through a [`LayerBackend`].
pub struct LayerStore<B: LayerBackend> {
    backend: B,
    config: CanvasConfig,
    /// Fill used for the next inserted layer.
    default_fill: Rgb,
}

impl<B: LayerBackend> LayerStore<B> {
    pub fn new(backend: B, config: CanvasConfig) -> Self {
        let default_fill = config.default_fill;
        Self {
            backend,
            config,
            default_fill,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn default_fill(&self) -> Rgb {
        self.default_fill
    }

    pub fn layer(&self, id: &LayerId) -> Option<Layer> {
        self.backend.layer(id)
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.backend.contains(id)
    }

    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Layer ids back to front.
    pub fn order(&self) -> Vec<LayerId> {
        self.backend.order()
    }

    /// Layers back to front, skipping order entries without a record.
    pub fn layers_ordered(&self) -> Vec<(LayerId, Layer)> {
        self.backend
            .order()
            .into_iter()
            .filter_map(|id| self.backend.layer(&id).map(|layer| (id, layer)))
            .collect()
    }

    /// Insert a new layer of `kind` at `point` with the current default fill.
    ///
    /// Boxed kinds are centered on `point`; text is anchored with its top-left
    /// corner at `point`. Returns `None` when the layer cap is reached. Paths are
    /// only created from strokes, see [`LayerStore::insert_path`].
    pub fn insert_shape_layer(&mut self, kind: LayerKind, point: Point) -> BackendResult<Option<LayerId>> {
        let fill = self.default_fill;
        let centered = |size: BoxSize| Point::new(point.x - size.width / 2.0, point.y - size.height / 2.0);

        let layer = match kind {
            LayerKind::Rectangle => {
                let size = self.config.default_shape_size;
                Layer::Rectangle(Rectangle::new(centered(size), size.width, size.height, fill))
            }
            LayerKind::Ellipse => {
                let size = self.config.default_shape_size;
                Layer::Ellipse(Ellipse::new(centered(size), size.width, size.height, fill))
            }
            LayerKind::Note => {
                let size = self.config.default_shape_size;
                Layer::Note(Note::new(centered(size), size.width, size.height, fill))
            }
            LayerKind::Text => {
                let size = self.config.default_text_size;
                Layer::Text(Text::new(point, size.width, size.height, fill))
            }
            LayerKind::Diagram => {
                let size = self.config.default_diagram_size;
                let spec = self.config.diagram_placeholder.clone();
                Layer::Diagram(Diagram::new(centered(size), size.width, size.height, fill, spec))
            }
            LayerKind::Path => {
                log::debug!("Path layers are created from strokes, not inserted at a point");
                return Ok(None);
            }
        };
        self.insert_layer(layer)
    }

    /// Insert a finalized freehand path.
    pub fn insert_path(&mut self, path: Path) -> BackendResult<Option<LayerId>> {
        self.insert_layer(Layer::Path(path))
    }

    fn insert_layer(&mut self, layer: Layer) -> BackendResult<Option<LayerId>> {
        if self.backend.len() >= self.config.max_layers {
            log::debug!("Layer cap of {} reached, insert ignored", self.config.max_layers);
            return Ok(None);
        }
        let id = LayerId::new();
        self.backend.insert(&id, &layer)?;
        let tail = self.backend.order().len();
        self.backend.order_insert(tail, &id)?;
        self.backend.commit();
        log::debug!("Inserted {} layer {id}", layer.kind().as_str());
        Ok(Some(id))
    }

    /// Remove `id` from the map and the order list. Absent ids are a no-op.
    pub fn erase_layer_by_id(&mut self, id: &LayerId) -> BackendResult<bool> {
        let erased = self.erase_uncommitted(id)?;
        if erased {
            self.backend.commit();
        } else {
            log::debug!("Erase of unknown layer {id} ignored");
        }
        Ok(erased)
    }

    /// Erase several layers as one transaction.
    pub fn erase_layers(&mut self, ids: &[LayerId]) -> BackendResult<usize> {
        let mut erased = 0;
        for id in ids {
            if self.erase_uncommitted(id)? {
                erased += 1;
            }
        }
        if erased > 0 {
            self.backend.commit();
        }
        Ok(erased)
    }

    fn erase_uncommitted(&mut self, id: &LayerId) -> BackendResult<bool> {
        let order = self.backend.order();
        let positions: Vec<usize> = order
            .iter()
            .enumerate()
            .filter(|(_, other)| *other == id)
            .map(|(i, _)| i)
            .collect();
        for &index in positions.iter().rev() {
            self.backend.order_remove(index)?;
        }
        let removed = self.backend.remove(id)?;
        Ok(removed || !positions.is_empty())
    }

    /// Move the selected layers to the top, keeping their relative order.
    pub fn move_to_front(&mut self, selection: &[LayerId]) -> BackendResult<bool> {
        self.reorder(selection, true)
    }

    /// Move the selected layers to the bottom, keeping their relative order.
    pub fn move_to_back(&mut self, selection: &[LayerId]) -> BackendResult<bool> {
        self.reorder(selection, false)
    }

    fn reorder(&mut self, selection: &[LayerId], to_front: bool) -> BackendResult<bool> {
        let order = self.backend.order();
        let selected: Vec<usize> = order
            .iter()
            .enumerate()
            .filter(|(_, id)| selection.contains(id))
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return Ok(false);
        }

        let moving: Vec<LayerId> = selected.iter().map(|&i| order[i].clone()).collect();
        let target: Vec<LayerId> = if to_front {
            order.iter().filter(|id| !moving.contains(id)).chain(&moving).cloned().collect()
        } else {
            moving.iter().chain(order.iter().filter(|id| !moving.contains(id))).cloned().collect()
        };
        if target == order {
            return Ok(false);
        }

        for &index in selected.iter().rev() {
            self.backend.order_remove(index)?;
        }
        let remaining = order.len() - moving.len();
        let start = if to_front { remaining } else { 0 };
        for (offset, id) in moving.iter().enumerate() {
            self.backend.order_insert(start + offset, id)?;
        }
        self.backend.commit();
        Ok(true)
    }

    /// Fill every selected layer with `color` and use it for later insertions.
    pub fn set_fill_for_selection(&mut self, selection: &[LayerId], color: Rgb) -> BackendResult<()> {
        self.default_fill = color;
        let patch = LayerPatch::fill(color);
        let mut touched = false;
        for id in selection {
            touched |= self.backend.update(id, &patch)?;
        }
        if touched {
            self.backend.commit();
        }
        Ok(())
    }

    /// Shift every selected layer by `delta`.
    pub fn translate(&mut self, selection: &[LayerId], delta: Vec2) -> BackendResult<()> {
        let mut touched = false;
        for id in selection {
            let Some(layer) = self.backend.layer(id) else {
                continue;
            };
            let patch = LayerPatch::position(layer.position() + delta);
            touched |= self.backend.update(id, &patch)?;
        }
        if touched {
            self.backend.commit();
        }
        Ok(())
    }

    /// Move and size one layer to `bounds`.
    pub fn resize(&mut self, id: &LayerId, bounds: Rect) -> BackendResult<bool> {
        let Some(mut layer) = self.backend.layer(id) else {
            log::debug!("Resize of unknown layer {id} ignored");
            return Ok(false);
        };
        layer.set_bounds(bounds);
        let updated = self.backend.update(id, &LayerPatch::geometry_of(&layer))?;
        if updated {
            self.backend.commit();
        }
        Ok(updated)
    }

    /// Replace the text of a Text or Note layer.
    pub fn set_text(&mut self, id: &LayerId, value: &str) -> BackendResult<bool> {
        match self.backend.layer(id).map(|l| l.kind()) {
            Some(LayerKind::Text | LayerKind::Note) => self.update_committed(id, &LayerPatch::value(value)),
            _ => Ok(false),
        }
    }

    /// Replace the specification of a Diagram layer.
    pub fn set_diagram_spec(&mut self, id: &LayerId, spec: &str) -> BackendResult<bool> {
        match self.backend.layer(id).map(|l| l.kind()) {
            Some(LayerKind::Diagram) => self.update_committed(id, &LayerPatch::spec(spec)),
            _ => Ok(false),
        }
    }

    fn update_committed(&mut self, id: &LayerId, patch: &LayerPatch) -> BackendResult<bool> {
        let updated = self.backend.update(id, patch)?;
        if updated {
            self.backend.commit();
        }
        Ok(updated)
    }

    /// Topmost layer whose shape is within `tolerance` of `point`.
    pub fn topmost_at(&self, point: Point, tolerance: f64) -> Option<LayerId> {
        self.layers_ordered()
            .into_iter()
            .rev()
            .find(|(_, layer)| layer.hit_test(point, tolerance))
            .map(|(id, _)| id)
    }

    /// Topmost layer under the eraser at `point`.
    ///
    /// Paths get a wider tolerance since thin strokes are hard to hit.
    pub fn layer_at_point(&self, point: Point) -> Option<LayerId> {
        let base = self.config.eraser_tolerance;
        let path_tolerance = base * self.config.path_eraser_multiplier;
        self.layers_ordered()
            .into_iter()
            .rev()
            .find(|(_, layer)| {
                let tolerance = match layer {
                    Layer::Path(_) => path_tolerance,
                    _ => base,
                };
                layer.hit_test(point, tolerance)
            })
            .map(|(id, _)| id)
    }

    /// Layers caught by a selection net from `origin` to `current`, back to front.
    pub fn layers_in_net(&self, origin: Point, current: Point) -> Vec<LayerId> {
        let layers = self.layers_ordered();
        net_selection(
            layers.iter().map(|(id, layer)| (id, layer.bounds())),
            origin,
            current,
            self.config.selection_net_tolerance,
        )
    }

    /// Make the order list a permutation of the map keys again.
    ///
    /// Concurrent merges can leave duplicates, dangling ids or missing ids.
    /// Duplicates keep their first position; missing ids go on top. The fix is
    /// committed outside the undo history so undo never reintroduces the damage.
    pub fn repair_order(&mut self) -> BackendResult<bool> {
        let order = self.backend.order();
        let keys: HashSet<LayerId> = self.backend.ids().into_iter().collect();

        let mut seen = HashSet::new();
        let mut drop = Vec::new();
        for (i, id) in order.iter().enumerate() {
            if !keys.contains(id) || !seen.insert(id.clone()) {
                drop.push(i);
            }
        }
        let mut missing: Vec<LayerId> = keys.difference(&seen).cloned().collect();
        missing.sort();

        if drop.is_empty() && missing.is_empty() {
            return Ok(false);
        }
        log::warn!(
            "Repairing order list: {} stale entries, {} missing layers",
            drop.len(),
            missing.len()
        );
        self.backend.commit();
        for &index in drop.iter().rev() {
            self.backend.order_remove(index)?;
        }
        let mut tail = order.len() - drop.len();
        for id in &missing {
            self.backend.order_insert(tail, id)?;
            tail += 1;
        }
        self.backend.commit_untracked();
        Ok(true)
    }

    pub fn pause_history(&mut self) -> BackendResult<()> {
        self.backend.pause_history()
    }

    pub fn resume_history(&mut self) {
        self.backend.resume_history();
    }

    /// Undo the last local step, then re-check the order list.
    pub fn undo(&mut self) -> BackendResult<bool> {
        let applied = self.backend.undo()?;
        if applied {
            self.repair_order()?;
        }
        Ok(applied)
    }

    /// Redo the last undone step, then re-check the order list.
    pub fn redo(&mut self) -> BackendResult<bool> {
        let applied = self.backend.redo()?;
        if applied {
            self.repair_order()?;
        }
        Ok(applied)
    }

    pub fn can_undo(&self) -> bool {
        self.backend.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.backend.can_redo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::MemoryBackend;
    use crate::layers::StrokePoint;

    fn store() -> LayerStore<MemoryBackend> {
        LayerStore::new(MemoryBackend::default(), CanvasConfig::default())
    }

    fn insert_rect(store: &mut LayerStore<MemoryBackend>, x: f64, y: f64) -> LayerId {
        store.insert_shape_layer(LayerKind::Rectangle, Point::new(x, y)).unwrap().unwrap()
    }

    #[test]
    fn test_insert_centers_shape() {
        let mut store = store();
        let id = insert_rect(&mut store, 200.0, 150.0);
        assert_eq!(store.layer(&id).unwrap().bounds(), Rect::new(150.0, 100.0, 250.0, 200.0));
        assert_eq!(store.order(), vec![id]);
    }

    #[test]
    fn test_text_is_anchored_and_diagram_has_placeholder() {
        let mut store = store();
        let text = store.insert_shape_layer(LayerKind::Text, Point::new(10.0, 20.0)).unwrap().unwrap();
        assert_eq!(store.layer(&text).unwrap().position(), Point::new(10.0, 20.0));

        let diagram = store.insert_shape_layer(LayerKind::Diagram, Point::new(400.0, 300.0)).unwrap().unwrap();
        let layer = store.layer(&diagram).unwrap();
        assert_eq!(layer.bounds(), Rect::new(240.0, 180.0, 560.0, 420.0));
        assert_eq!(layer.spec(), Some(store.config().diagram_placeholder.as_str()));
    }

    #[test]
    fn test_path_kind_is_not_inserted_at_point() {
        let mut store = store();
        assert_eq!(store.insert_shape_layer(LayerKind::Path, Point::ZERO).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_cap_rejects_silently() {
        let config = CanvasConfig {
            max_layers: 2,
            ..CanvasConfig::default()
        };
        let mut store = LayerStore::new(MemoryBackend::default(), config);
        insert_rect(&mut store, 0.0, 0.0);
        insert_rect(&mut store, 0.0, 0.0);
        assert_eq!(store.insert_shape_layer(LayerKind::Ellipse, Point::ZERO).unwrap(), None);
        assert_eq!(store.len(), 2);
        assert_eq!(store.order().len(), 2);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let mut store = store();
        let id = insert_rect(&mut store, 0.0, 0.0);
        assert!(store.erase_layer_by_id(&id).unwrap());
        assert!(!store.erase_layer_by_id(&id).unwrap());
        assert!(store.is_empty());
        assert!(store.order().is_empty());
    }

    #[test]
    fn test_move_to_front_keeps_relative_order() {
        let mut store = store();
        let ids: Vec<LayerId> = (0..4).map(|i| insert_rect(&mut store, i as f64, 0.0)).collect();

        // Select out of order; result must follow the current stacking.
        assert!(store.move_to_front(&[ids[2].clone(), ids[0].clone()]).unwrap());
        assert_eq!(store.order(), vec![ids[1].clone(), ids[3].clone(), ids[0].clone(), ids[2].clone()]);

        assert!(store.move_to_back(&[ids[2].clone(), ids[3].clone()]).unwrap());
        assert_eq!(store.order(), vec![ids[3].clone(), ids[2].clone(), ids[1].clone(), ids[0].clone()]);

        // Already at the back.
        assert!(!store.move_to_back(&[ids[3].clone()]).unwrap());
    }

    #[test]
    fn test_set_fill_updates_default() {
        let mut store = store();
        let id = insert_rect(&mut store, 0.0, 0.0);
        let blue = Rgb::new(0, 0, 255);
        store.set_fill_for_selection(&[id.clone()], blue).unwrap();
        assert_eq!(store.layer(&id).unwrap().fill(), blue);

        let next = insert_rect(&mut store, 0.0, 0.0);
        assert_eq!(store.layer(&next).unwrap().fill(), blue);
    }

    #[test]
    fn test_translate_skips_unknown_ids() {
        let mut store = store();
        let id = insert_rect(&mut store, 200.0, 150.0);
        store
            .translate(&[id.clone(), LayerId::from("ghost")], Vec2::new(30.0, -10.0))
            .unwrap();
        assert_eq!(store.layer(&id).unwrap().position(), Point::new(180.0, 90.0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_resize_path_scales_points() {
        let mut store = store();
        let path = Path::new(
            Point::new(0.0, 0.0),
            20.0,
            20.0,
            Rgb::new(0, 0, 0),
            vec![StrokePoint::new(0.0, 0.0, 0.5), StrokePoint::new(20.0, 20.0, 0.5)],
            4.0,
        );
        let id = store.insert_path(path).unwrap().unwrap();
        assert!(store.resize(&id, Rect::new(0.0, 0.0, 40.0, 40.0)).unwrap());
        match store.layer(&id).unwrap() {
            Layer::Path(p) => assert_eq!(p.points[1], StrokePoint::new(40.0, 40.0, 0.5)),
            other => panic!("expected path, got {other:?}"),
        }
        assert!(!store.resize(&LayerId::from("ghost"), Rect::ZERO).unwrap());
    }

    #[test]
    fn test_content_edits_respect_kind() {
        let mut store = store();
        let note = store.insert_shape_layer(LayerKind::Note, Point::ZERO).unwrap().unwrap();
        let rect = insert_rect(&mut store, 0.0, 0.0);

        assert!(store.set_text(&note, "todo").unwrap());
        assert!(!store.set_text(&rect, "todo").unwrap());
        assert!(!store.set_diagram_spec(&note, "graph LR").unwrap());
        assert_eq!(store.layer(&note).unwrap().value(), Some("todo"));
    }

    #[test]
    fn test_eraser_picks_topmost() {
        let mut store = store();
        let bottom = insert_rect(&mut store, 100.0, 100.0);
        let top = insert_rect(&mut store, 120.0, 120.0);
        assert_eq!(store.layer_at_point(Point::new(110.0, 110.0)), Some(top));
        assert_eq!(store.layer_at_point(Point::new(45.0, 45.0)), Some(bottom));
        assert_eq!(store.layer_at_point(Point::new(500.0, 500.0)), None);
    }

    #[test]
    fn test_eraser_path_tolerance_is_doubled() {
        let mut store = store();
        let path = Path::new(
            Point::new(0.0, 0.0),
            100.0,
            0.0,
            Rgb::new(0, 0, 0),
            vec![StrokePoint::new(0.0, 0.0, 0.5), StrokePoint::new(100.0, 0.0, 0.5)],
            2.0,
        );
        let id = store.insert_path(path).unwrap().unwrap();
        // 25px away: outside 15 + 1, inside 30 + 1.
        assert_eq!(store.layer_at_point(Point::new(50.0, 25.0)), Some(id));
        assert_eq!(store.layer_at_point(Point::new(50.0, 35.0)), None);
    }

    #[test]
    fn test_repair_order() {
        let mut store = store();
        let a = insert_rect(&mut store, 0.0, 0.0);
        let b = insert_rect(&mut store, 0.0, 0.0);

        // Simulate a bad merge: duplicate `a`, dangling id, `b` missing.
        let backend = store.backend_mut();
        backend.order_remove(1).unwrap();
        backend.order_insert(1, &a).unwrap();
        backend.order_insert(2, &LayerId::from("ghost")).unwrap();
        backend.commit();

        assert!(store.repair_order().unwrap());
        assert_eq!(store.order(), vec![a, b]);
        assert!(!store.repair_order().unwrap());
    }

    #[test]
    fn test_repair_is_not_an_undo_step() {
        let mut store = store();
        let a = insert_rect(&mut store, 0.0, 0.0);
        let b = insert_rect(&mut store, 0.0, 0.0);

        let backend = store.backend_mut();
        backend.order_insert(2, &a).unwrap();
        backend.commit();
        let steps = store.backend().undo_count();
        assert!(store.repair_order().unwrap());
        assert_eq!(store.backend().undo_count(), steps);

        // Undo reverts the corrupting write, never the repair alone.
        assert!(store.undo().unwrap());
        assert_eq!(store.order(), vec![a.clone(), b.clone()]);
        assert!(store.redo().unwrap());
        assert_eq!(store.order(), vec![a, b]);
    }
}
