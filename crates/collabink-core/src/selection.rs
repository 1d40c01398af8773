//! Selection set, selection net and resize handles.

use crate::geometry::{manhattan_distance, rect_from_points, rects_overlap};
use crate::layers::LayerId;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Handle size in screen pixels.
pub const HANDLE_SIZE: f64 = 8.0;
/// Handle hit tolerance in screen pixels.
pub const HANDLE_HIT_TOLERANCE: f64 = 8.0;

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Edge positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

/// The part of a selection box grabbed to resize it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResizeHandle {
    Corner(Corner),
    Edge(Edge),
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::Corner(Corner::TopLeft),
        ResizeHandle::Edge(Edge::Top),
        ResizeHandle::Corner(Corner::TopRight),
        ResizeHandle::Edge(Edge::Right),
        ResizeHandle::Corner(Corner::BottomRight),
        ResizeHandle::Edge(Edge::Bottom),
        ResizeHandle::Corner(Corner::BottomLeft),
        ResizeHandle::Edge(Edge::Left),
    ];

    pub fn moves_left(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::TopLeft | Corner::BottomLeft) | ResizeHandle::Edge(Edge::Left)
        )
    }

    pub fn moves_right(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::TopRight | Corner::BottomRight) | ResizeHandle::Edge(Edge::Right)
        )
    }

    pub fn moves_top(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::TopLeft | Corner::TopRight) | ResizeHandle::Edge(Edge::Top)
        )
    }

    pub fn moves_bottom(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::BottomLeft | Corner::BottomRight) | ResizeHandle::Edge(Edge::Bottom)
        )
    }

    /// Position of this handle on `bounds`.
    pub fn position(self, bounds: Rect) -> Point {
        let center = bounds.center();
        match self {
            ResizeHandle::Corner(Corner::TopLeft) => Point::new(bounds.x0, bounds.y0),
            ResizeHandle::Corner(Corner::TopRight) => Point::new(bounds.x1, bounds.y0),
            ResizeHandle::Corner(Corner::BottomLeft) => Point::new(bounds.x0, bounds.y1),
            ResizeHandle::Corner(Corner::BottomRight) => Point::new(bounds.x1, bounds.y1),
            ResizeHandle::Edge(Edge::Top) => Point::new(center.x, bounds.y0),
            ResizeHandle::Edge(Edge::Right) => Point::new(bounds.x1, center.y),
            ResizeHandle::Edge(Edge::Bottom) => Point::new(center.x, bounds.y1),
            ResizeHandle::Edge(Edge::Left) => Point::new(bounds.x0, center.y),
        }
    }
}

/// A selection handle with its position and type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    /// Position in canvas coordinates.
    pub position: Point,
    pub kind: ResizeHandle,
}

impl Handle {
    pub fn new(position: Point, kind: ResizeHandle) -> Self {
        Self { position, kind }
    }

    /// Check if a canvas point hits this handle's square.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        (point.x - self.position.x).abs() <= tolerance && (point.y - self.position.y).abs() <= tolerance
    }
}

/// Corner and edge handles for a selection box.
pub fn handles(bounds: Rect) -> Vec<Handle> {
    ResizeHandle::ALL
        .iter()
        .map(|&kind| Handle::new(kind.position(bounds), kind))
        .collect()
}

/// Find which handle (if any) is hit at the given point.
pub fn hit_test_handles(bounds: Rect, point: Point, tolerance: f64) -> Option<ResizeHandle> {
    handles(bounds)
        .into_iter()
        .find(|h| h.hit_test(point, tolerance))
        .map(|h| h.kind)
}

/// Whether a press has travelled far enough to become a selection net.
pub fn exceeds_net_threshold(origin: Point, current: Point, threshold: f64) -> bool {
    manhattan_distance(origin, current) > threshold
}

/// Ids whose boxes overlap the net spanned by `origin` and `current`.
///
/// `layers` is visited in order, so passing the order list yields a back-to-front result.
pub fn net_selection<'a>(
    layers: impl IntoIterator<Item = (&'a LayerId, Rect)>,
    origin: Point,
    current: Point,
    tolerance: f64,
) -> Vec<LayerId> {
    let net = rect_from_points(origin, current);
    layers
        .into_iter()
        .filter(|(_, bounds)| rects_overlap(*bounds, net, tolerance))
        .map(|(id, _)| id.clone())
        .collect()
}

/// The local client's ordered selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<LayerId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[LayerId] {
        &self.ids
    }

    /// The layer targeted by resizing.
    pub fn first(&self) -> Option<&LayerId> {
        self.ids.first()
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Make `id` the sole selection.
    pub fn select_only(&mut self, id: LayerId) {
        self.ids.clear();
        self.ids.push(id);
    }

    /// Replace the selection. Duplicates are dropped, first occurrence wins.
    pub fn set(&mut self, ids: impl IntoIterator<Item = LayerId>) {
        self.ids.clear();
        for id in ids {
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop ids that no longer exist.
    pub fn retain(&mut self, mut keep: impl FnMut(&LayerId) -> bool) {
        self.ids.retain(|id| keep(id));
    }
}
