//! Canvas state machine: routes pointer and key input to the store, the local
//! selection and the presence broadcaster.

use crate::camera::Camera;
use crate::crdt::{BackendError, LayerBackend, LoroBackend, Subscriber, SubscriptionId};
use crate::geometry::{rect_from_points, resize_bounds};
use crate::input::{InputState, KeyEvent, Modifiers, MouseButton, PointerEvent};
use crate::layers::{Layer, LayerId, LayerKind, Rgb};
use crate::presence::{
    ParticipantDirectory, PresenceBroadcaster, PresenceChannel, PresenceError, RemoteCursor, remote_cursors,
};
use crate::selection::{HANDLE_HIT_TOLERANCE, ResizeHandle, Selection, exceeds_net_threshold, hit_test_handles};
use crate::store::LayerStore;
use crate::stroke::StrokeDraft;
use crate::tools::{ToolKind, ToolSettings};
use kurbo::{Point, Rect, Vec2};
use thiserror::Error;

/// Canvas errors.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Presence(#[from] PresenceError),
}

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// What the pointer is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CanvasState {
    #[default]
    Idle,
    /// Pressed on empty canvas, not yet dragged far enough for a net.
    Pressing { origin: Point },
    SelectionNet { origin: Point, current: Point },
    /// Dragging the selection; `last` is where the previous delta ended.
    Translating { last: Point },
    /// Waiting for a click to place a layer of this kind.
    Inserting(LayerKind),
    Resizing { initial: Rect, handle: ResizeHandle },
    /// Drawing strokes, optionally with a width that overrides the pen settings.
    Pencil(Option<f64>),
    Eraser,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct CanvasFrame {
    pub camera: Camera,
    /// Layers back to front.
    pub layers: Vec<(LayerId, Layer)>,
    pub selection: Vec<LayerId>,
    /// Box that resize handles are drawn around.
    pub handle_bounds: Option<Rect>,
    /// Drag rectangle while a selection net is active.
    pub selection_net: Option<Rect>,
    pub local_draft: Option<StrokeDraft>,
    pub stroke_width: f64,
    pub editing: Option<LayerId>,
    pub remote: Vec<RemoteCursor>,
}

/// A collaborative canvas for one local participant.
pub struct Canvas<B: LayerBackend, P: PresenceChannel> {
    store: LayerStore<B>,
    presence: PresenceBroadcaster<P>,
    selection: Selection,
    state: CanvasState,
    camera: Camera,
    input: InputState,
    settings: ToolSettings,
    draft: Option<StrokeDraft>,
    editing: Option<LayerId>,
    history_paused: bool,
}

impl<B: LayerBackend, P: PresenceChannel> Canvas<B, P> {
    pub fn new(store: LayerStore<B>, channel: P) -> Self {
        let settings = ToolSettings::from_config(store.config());
        Self {
            store,
            presence: PresenceBroadcaster::new(channel),
            selection: Selection::new(),
            state: CanvasState::Idle,
            camera: Camera::new(),
            input: InputState::new(),
            settings,
            draft: None,
            editing: None,
            history_paused: false,
        }
    }

    pub fn store(&self) -> &LayerStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LayerStore<B> {
        &mut self.store
    }

    pub fn presence(&self) -> &PresenceBroadcaster<P> {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceBroadcaster<P> {
        &mut self.presence
    }

    pub fn state(&self) -> CanvasState {
        self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn editing(&self) -> Option<&LayerId> {
        self.editing.as_ref()
    }

    /// Tool implied by the current state.
    pub fn tool(&self) -> ToolKind {
        match self.state {
            CanvasState::Inserting(kind) => ToolKind::Insert(kind),
            CanvasState::Pencil(_) => ToolKind::Pencil,
            CanvasState::Eraser => ToolKind::Eraser,
            _ => ToolKind::Select,
        }
    }

    /// Switch tools. Any gesture in progress ends where it is.
    pub fn select_tool(&mut self, tool: ToolKind) -> CanvasResult<()> {
        self.end_gesture();
        self.discard_draft()?;
        self.state = match tool {
            ToolKind::Select => CanvasState::Idle,
            ToolKind::Insert(LayerKind::Path) | ToolKind::Pencil => CanvasState::Pencil(None),
            ToolKind::Insert(kind) => CanvasState::Inserting(kind),
            ToolKind::Eraser => CanvasState::Eraser,
        };
        log::debug!("Tool changed to {:?}", self.tool());
        Ok(())
    }

    /// Arm the pencil with a stroke width for this session only.
    ///
    /// `None` draws with the width from the pen settings.
    pub fn arm_pencil(&mut self, stroke_width: Option<f64>) -> CanvasResult<()> {
        self.end_gesture();
        self.discard_draft()?;
        let stroke_width = stroke_width.filter(|width| {
            let valid = *width > 0.0;
            if !valid {
                log::debug!("Ignoring pencil width {width}");
            }
            valid
        });
        self.state = CanvasState::Pencil(stroke_width);
        Ok(())
    }

    /// Pen settings in effect, including a pencil width override.
    pub fn pen_settings(&self) -> ToolSettings {
        let mut settings = self.settings;
        if let CanvasState::Pencil(Some(width)) = self.state {
            settings.stroke_width = width;
        }
        settings
    }

    pub fn set_pen_color(&mut self, color: Rgb) {
        self.settings.pen_color = color;
    }

    pub fn set_stroke_width(&mut self, width: f64) {
        self.settings.set_stroke_width(width);
    }

    /// Record the modifier keys reported by the host.
    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.input.set_modifiers(modifiers);
    }

    /// Subscribe to per-layer change notifications.
    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.store.backend_mut().subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.backend_mut().unsubscribe(id)
    }

    /// Handle a raw pointer event in screen coordinates.
    ///
    /// A press is routed to a resize handle of the selection first, then to the
    /// topmost layer under the pointer, then to the empty canvas.
    pub fn handle_pointer_event(&mut self, event: &PointerEvent) -> CanvasResult<()> {
        self.input.handle_pointer_event(event);
        let point = self.camera.screen_to_world(event.position());
        match *event {
            PointerEvent::Down { button, pressure, .. } => {
                if button != MouseButton::Left {
                    return Ok(());
                }
                if let Some(handle) = self.handle_at(point) {
                    return self.resize_handle_pointer_down(handle);
                }
                let over_layer = match self.state {
                    CanvasState::Idle | CanvasState::Pressing { .. } => self.store.topmost_at(point, 0.0),
                    _ => None,
                };
                match over_layer {
                    Some(id) => self.layer_pointer_down(&id, point),
                    None => self.pointer_down(point, pressure),
                }
            }
            PointerEvent::Move { pressure, .. } => self.pointer_move(point, pressure),
            PointerEvent::Up { button, .. } => {
                if button == MouseButton::Left {
                    self.pointer_up(point)
                } else {
                    Ok(())
                }
            }
            PointerEvent::Scroll { delta, .. } => {
                self.wheel(delta);
                Ok(())
            }
        }
    }

    fn handle_at(&self, point: Point) -> Option<ResizeHandle> {
        if !matches!(self.state, CanvasState::Idle) {
            return None;
        }
        let bounds = self.handle_bounds()?;
        hit_test_handles(bounds, point, HANDLE_HIT_TOLERANCE)
    }

    /// Bounds of the first selected layer, where resize handles sit.
    pub fn handle_bounds(&self) -> Option<Rect> {
        let id = self.selection.first()?;
        self.store.layer(id).map(|layer| layer.bounds())
    }

    /// Press on empty canvas at `point` (canvas coordinates).
    pub fn pointer_down(&mut self, point: Point, pressure: f64) -> CanvasResult<()> {
        match self.state {
            CanvasState::Inserting(_) => {}
            CanvasState::Pencil(_) => {
                let draft = StrokeDraft::start(point, pressure, self.settings.pen_color);
                self.presence.set_pencil_draft(Some(&draft))?;
                self.draft = Some(draft);
            }
            CanvasState::Eraser => self.erase_at(point)?,
            _ => self.state = CanvasState::Pressing { origin: point },
        }
        Ok(())
    }

    /// Press on the layer `id`.
    pub fn layer_pointer_down(&mut self, id: &LayerId, point: Point) -> CanvasResult<()> {
        match self.state {
            CanvasState::Pencil(_) | CanvasState::Inserting(_) => Ok(()),
            CanvasState::Eraser => {
                if self.store.erase_layer_by_id(id)? {
                    self.forget(id)?;
                }
                Ok(())
            }
            _ => {
                if !self.selection.contains(id) {
                    self.selection.select_only(id.clone());
                    self.presence.set_selection(self.selection.ids())?;
                }
                self.begin_gesture()?;
                self.state = CanvasState::Translating { last: point };
                Ok(())
            }
        }
    }

    /// Press on a resize handle of the first selected layer.
    pub fn resize_handle_pointer_down(&mut self, handle: ResizeHandle) -> CanvasResult<()> {
        let Some(initial) = self.handle_bounds() else {
            return Ok(());
        };
        self.begin_gesture()?;
        self.state = CanvasState::Resizing { initial, handle };
        Ok(())
    }

    /// Pointer moved to `point` (canvas coordinates).
    pub fn pointer_move(&mut self, point: Point, pressure: f64) -> CanvasResult<()> {
        self.presence.move_cursor(Some(point), &self.pen_settings())?;

        match self.state {
            CanvasState::Pressing { origin } => {
                if exceeds_net_threshold(origin, point, self.store.config().selection_net_threshold) {
                    self.state = CanvasState::SelectionNet { origin, current: point };
                    self.update_net(origin, point)?;
                }
            }
            CanvasState::SelectionNet { origin, .. } => {
                self.state = CanvasState::SelectionNet { origin, current: point };
                self.update_net(origin, point)?;
            }
            CanvasState::Translating { last } => {
                let delta = point - last;
                if delta != Vec2::ZERO {
                    self.store.translate(self.selection.ids(), delta)?;
                }
                self.state = CanvasState::Translating { last: point };
            }
            CanvasState::Resizing { initial, handle } => {
                if let Some(id) = self.selection.first().cloned() {
                    let bounds = resize_bounds(initial, handle, point, self.store.config().min_layer_size);
                    self.store.resize(&id, bounds)?;
                }
            }
            CanvasState::Pencil(_) => {
                if !self.input.primary_held() {
                    return Ok(());
                }
                if let Some(draft) = self.draft.as_mut() {
                    if draft.continue_to(point, pressure) {
                        self.presence.set_pencil_draft(Some(draft))?;
                    }
                }
            }
            CanvasState::Eraser => {
                if self.input.primary_held() {
                    self.erase_at(point)?;
                }
            }
            CanvasState::Idle | CanvasState::Inserting(_) => {}
        }
        Ok(())
    }

    /// Pointer released at `point` (canvas coordinates).
    pub fn pointer_up(&mut self, point: Point) -> CanvasResult<()> {
        match self.state {
            CanvasState::Idle | CanvasState::Pressing { .. } => {
                self.clear_selection()?;
                self.state = CanvasState::Idle;
            }
            CanvasState::Pencil(_) => self.finalize_stroke()?,
            CanvasState::Inserting(kind) => {
                if let Some(id) = self.store.insert_shape_layer(kind, point)? {
                    self.selection.select_only(id);
                    self.presence.set_selection(self.selection.ids())?;
                }
                self.state = CanvasState::Idle;
            }
            CanvasState::Translating { .. } | CanvasState::Resizing { .. } => {
                self.end_gesture();
                self.state = CanvasState::Idle;
            }
            CanvasState::SelectionNet { .. } | CanvasState::Eraser => self.state = CanvasState::Idle,
        }
        Ok(())
    }

    /// Apply a wheel delta to the camera.
    pub fn wheel(&mut self, delta: Vec2) {
        self.camera.wheel(delta);
    }

    /// The pointer left the canvas.
    pub fn pointer_leave(&mut self) -> CanvasResult<()> {
        self.presence.move_cursor(None, &self.pen_settings())?;
        Ok(())
    }

    fn update_net(&mut self, origin: Point, current: Point) -> CanvasResult<()> {
        let caught = self.store.layers_in_net(origin, current);
        self.selection.set(caught);
        self.presence.set_selection(self.selection.ids())?;
        Ok(())
    }

    fn erase_at(&mut self, point: Point) -> CanvasResult<()> {
        let Some(id) = self.store.layer_at_point(point) else {
            return Ok(());
        };
        if self.store.erase_layer_by_id(&id)? {
            self.forget(&id)?;
        }
        Ok(())
    }

    /// Drop local references to an erased layer.
    fn forget(&mut self, id: &LayerId) -> CanvasResult<()> {
        if self.selection.contains(id) {
            self.selection.retain(|other| other != id);
            self.presence.set_selection(self.selection.ids())?;
        }
        if self.editing.as_ref() == Some(id) {
            self.end_text_edit()?;
        }
        Ok(())
    }

    fn finalize_stroke(&mut self) -> CanvasResult<()> {
        let Some(draft) = self.draft.take() else {
            return Ok(());
        };
        self.presence.set_pencil_draft(None)?;
        match draft.finalize(self.pen_settings().stroke_width) {
            Some(path) => {
                self.store.insert_path(path)?;
            }
            None => log::debug!("Discarding stroke with fewer than two points"),
        }
        Ok(())
    }

    fn discard_draft(&mut self) -> CanvasResult<()> {
        if self.draft.take().is_some() {
            self.presence.set_pencil_draft(None)?;
        }
        Ok(())
    }

    fn begin_gesture(&mut self) -> CanvasResult<()> {
        if !self.history_paused {
            self.store.pause_history()?;
            self.history_paused = true;
        }
        Ok(())
    }

    fn end_gesture(&mut self) {
        if self.history_paused {
            self.store.resume_history();
            self.history_paused = false;
        }
    }

    pub fn clear_selection(&mut self) -> CanvasResult<()> {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.presence.set_selection(&[])?;
        }
        Ok(())
    }

    /// Drop selected ids that no longer exist.
    fn prune_selection(&mut self) -> CanvasResult<()> {
        let before = self.selection.len();
        let store = &self.store;
        self.selection.retain(|id| store.contains(id));
        if self.selection.len() != before {
            self.presence.set_selection(self.selection.ids())?;
        }
        if self.editing.as_ref().is_some_and(|id| !self.store.contains(id)) {
            self.end_text_edit()?;
        }
        Ok(())
    }

    /// Abandon the current gesture or tool and return to `Idle`.
    /// Writes already applied stay.
    pub fn escape(&mut self) -> CanvasResult<()> {
        if self.editing.is_some() {
            return self.end_text_edit();
        }
        self.end_gesture();
        self.discard_draft()?;
        self.state = CanvasState::Idle;
        self.clear_selection()
    }

    /// Erase every selected layer as one undo step.
    pub fn delete_selection(&mut self) -> CanvasResult<usize> {
        if self.selection.is_empty() {
            return Ok(0);
        }
        let ids = self.selection.ids().to_vec();
        let erased = self.store.erase_layers(&ids)?;
        self.clear_selection()?;
        if self.editing.as_ref().is_some_and(|id| ids.contains(id)) {
            self.end_text_edit()?;
        }
        Ok(erased)
    }

    pub fn undo(&mut self) -> CanvasResult<bool> {
        self.end_gesture();
        let applied = self.store.undo()?;
        self.prune_selection()?;
        Ok(applied)
    }

    pub fn redo(&mut self) -> CanvasResult<bool> {
        self.end_gesture();
        let applied = self.store.redo()?;
        self.prune_selection()?;
        Ok(applied)
    }

    pub fn move_to_front(&mut self) -> CanvasResult<bool> {
        Ok(self.store.move_to_front(self.selection.ids())?)
    }

    pub fn move_to_back(&mut self) -> CanvasResult<bool> {
        Ok(self.store.move_to_back(self.selection.ids())?)
    }

    /// Fill the selection; the color also becomes the fill of new layers.
    pub fn set_fill(&mut self, color: Rgb) -> CanvasResult<()> {
        Ok(self.store.set_fill_for_selection(self.selection.ids(), color)?)
    }

    /// Start editing the text of a Text or Note layer.
    pub fn begin_text_edit(&mut self, id: &LayerId) -> CanvasResult<bool> {
        match self.store.layer(id).map(|layer| layer.kind()) {
            Some(LayerKind::Text | LayerKind::Note) => {
                self.editing = Some(id.clone());
                self.presence.set_editing_text(true)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn end_text_edit(&mut self) -> CanvasResult<()> {
        if self.editing.take().is_some() {
            self.presence.set_editing_text(false)?;
        }
        Ok(())
    }

    /// Replace the text of the layer being edited.
    pub fn set_text(&mut self, value: &str) -> CanvasResult<bool> {
        let Some(id) = self.editing.clone() else {
            return Ok(false);
        };
        Ok(self.store.set_text(&id, value)?)
    }

    pub fn set_diagram_spec(&mut self, id: &LayerId, spec: &str) -> CanvasResult<bool> {
        Ok(self.store.set_diagram_spec(id, spec)?)
    }

    /// Handle a key event. Returns true when the key triggered an action.
    pub fn handle_key(&mut self, event: &KeyEvent) -> CanvasResult<bool> {
        self.input.handle_key_event(event);
        let KeyEvent::Pressed(key) = event else {
            return Ok(false);
        };
        let modifiers = self.input.modifiers;

        match key.as_str() {
            "Escape" => {
                self.escape()?;
                Ok(true)
            }
            "Delete" | "Backspace" if self.editing.is_none() => Ok(self.delete_selection()? > 0),
            "z" | "Z" if modifiers.command() => {
                if modifiers.shift {
                    self.redo()
                } else {
                    self.undo()
                }
            }
            "y" | "Y" if modifiers.command() => self.redo(),
            _ => Ok(false),
        }
    }

    /// Snapshot for rendering.
    pub fn frame(&self, directory: &dyn ParticipantDirectory) -> CanvasFrame {
        let selection_net = match self.state {
            CanvasState::SelectionNet { origin, current } => Some(rect_from_points(origin, current)),
            _ => None,
        };
        let handle_bounds = match self.state {
            CanvasState::Idle | CanvasState::Resizing { .. } | CanvasState::Translating { .. } => {
                self.handle_bounds()
            }
            _ => None,
        };
        CanvasFrame {
            camera: self.camera,
            layers: self.store.layers_ordered(),
            selection: self.selection.ids().to_vec(),
            handle_bounds,
            selection_net,
            local_draft: self.draft.clone(),
            stroke_width: self.pen_settings().stroke_width,
            editing: self.editing.clone(),
            remote: remote_cursors(&self.presence.channel().others(), directory),
        }
    }
}

impl<P: PresenceChannel> Canvas<LoroBackend, P> {
    /// Merge an update or snapshot from a peer.
    ///
    /// The order list is repaired afterwards, and selected layers that the
    /// peer erased drop out of the local selection.
    pub fn import_remote(&mut self, bytes: &[u8]) -> CanvasResult<()> {
        self.store.backend_mut().import(bytes)?;
        self.store.repair_order()?;
        self.prune_selection()
    }
}
