//! Layer definitions for the canvas.

mod diagram;
mod ellipse;
mod note;
mod path;
mod rectangle;
mod text;

pub use diagram::Diagram;
pub use ellipse::Ellipse;
pub use note::Note;
pub use path::{Path, StrokePoint};
pub use rectangle::Rectangle;
pub use text::Text;

use kurbo::{BezPath, Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique identifier of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque RGB fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Rgb> for Color {
    fn from(c: Rgb) -> Self {
        Color::from_rgba8(c.r, c.g, c.b, 255)
    }
}

/// Layer type tag, used where a layer type is chosen before the layer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Rectangle,
    Ellipse,
    Path,
    Text,
    Note,
    Diagram,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Rectangle => "rectangle",
            LayerKind::Ellipse => "ellipse",
            LayerKind::Path => "path",
            LayerKind::Text => "text",
            LayerKind::Note => "note",
            LayerKind::Diagram => "diagram",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rectangle" => Some(LayerKind::Rectangle),
            "ellipse" => Some(LayerKind::Ellipse),
            "path" => Some(LayerKind::Path),
            "text" => Some(LayerKind::Text),
            "note" => Some(LayerKind::Note),
            "diagram" => Some(LayerKind::Diagram),
            _ => None,
        }
    }
}

/// Behavior shared by every layer type.
pub trait LayerTrait {
    /// Bounding box in canvas coordinates.
    fn bounds(&self) -> Rect;

    /// Check if a canvas point hits this layer.
    fn hit_test(&self, point: Point, tolerance: f64) -> bool;

    /// Outline used for rendering.
    fn to_path(&self) -> BezPath;

    fn fill(&self) -> Rgb;

    fn set_fill(&mut self, fill: Rgb);

    /// Move and size the layer to `bounds`.
    fn set_bounds(&mut self, bounds: Rect);
}

/// One drawable object on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Rectangle(Rectangle),
    Ellipse(Ellipse),
    Path(Path),
    Text(Text),
    Note(Note),
    Diagram(Diagram),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Rectangle(_) => LayerKind::Rectangle,
            Layer::Ellipse(_) => LayerKind::Ellipse,
            Layer::Path(_) => LayerKind::Path,
            Layer::Text(_) => LayerKind::Text,
            Layer::Note(_) => LayerKind::Note,
            Layer::Diagram(_) => LayerKind::Diagram,
        }
    }

    fn inner(&self) -> &dyn LayerTrait {
        match self {
            Layer::Rectangle(l) => l,
            Layer::Ellipse(l) => l,
            Layer::Path(l) => l,
            Layer::Text(l) => l,
            Layer::Note(l) => l,
            Layer::Diagram(l) => l,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn LayerTrait {
        match self {
            Layer::Rectangle(l) => l,
            Layer::Ellipse(l) => l,
            Layer::Path(l) => l,
            Layer::Text(l) => l,
            Layer::Note(l) => l,
            Layer::Diagram(l) => l,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.inner().bounds()
    }

    pub fn position(&self) -> Point {
        self.bounds().origin()
    }

    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.inner().hit_test(point, tolerance)
    }

    pub fn to_path(&self) -> BezPath {
        self.inner().to_path()
    }

    pub fn fill(&self) -> Rgb {
        self.inner().fill()
    }

    pub fn set_fill(&mut self, fill: Rgb) {
        self.inner_mut().set_fill(fill);
    }

    pub fn set_bounds(&mut self, bounds: Rect) {
        self.inner_mut().set_bounds(bounds);
    }

    /// Shift the layer without changing its size.
    pub fn translate(&mut self, delta: Vec2) {
        let bounds = self.bounds();
        self.set_bounds(bounds + delta);
    }

    /// Text content of Text and Note layers.
    pub fn value(&self) -> Option<&str> {
        match self {
            Layer::Text(t) => Some(&t.value),
            Layer::Note(n) => Some(&n.value),
            _ => None,
        }
    }

    /// Specification string of Diagram layers.
    pub fn spec(&self) -> Option<&str> {
        match self {
            Layer::Diagram(d) => Some(&d.spec),
            _ => None,
        }
    }

    /// Apply a partial update. Fields that do not exist on this layer type are ignored.
    pub fn apply_patch(&mut self, patch: &LayerPatch) {
        if patch.position.is_some() || patch.size.is_some() {
            let current = self.bounds();
            let origin = patch.position.unwrap_or(current.origin());
            let (w, h) = patch.size.unwrap_or((current.width(), current.height()));
            match self {
                // Path points are written explicitly by the patch; do not rescale them.
                Layer::Path(p) => {
                    p.position = origin;
                    p.width = w;
                    p.height = h;
                }
                _ => self.set_bounds(Rect::from_origin_size(origin, (w, h))),
            }
        }
        if let Some(fill) = patch.fill {
            self.set_fill(fill);
        }
        match self {
            Layer::Text(t) => {
                if let Some(value) = &patch.value {
                    t.value = value.clone();
                }
            }
            Layer::Note(n) => {
                if let Some(value) = &patch.value {
                    n.value = value.clone();
                }
            }
            Layer::Diagram(d) => {
                if let Some(spec) = &patch.spec {
                    d.spec = spec.clone();
                }
            }
            Layer::Path(p) => {
                if let Some(points) = &patch.points {
                    p.points = points.clone();
                }
            }
            Layer::Rectangle(_) | Layer::Ellipse(_) => {}
        }
    }
}

/// A partial, per-field layer update.
///
/// Only the fields that are `Some` are written, so concurrent writers touching
/// different fields of one layer do not overwrite each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerPatch {
    pub position: Option<Point>,
    pub size: Option<(f64, f64)>,
    pub fill: Option<Rgb>,
    pub value: Option<String>,
    pub spec: Option<String>,
    pub points: Option<Vec<StrokePoint>>,
}

impl LayerPatch {
    pub fn position(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn fill(fill: Rgb) -> Self {
        Self {
            fill: Some(fill),
            ..Self::default()
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn spec(spec: impl Into<String>) -> Self {
        Self {
            spec: Some(spec.into()),
            ..Self::default()
        }
    }

    /// Patch carrying the full geometry of `layer`: box, plus points for paths.
    pub fn geometry_of(layer: &Layer) -> Self {
        let bounds = layer.bounds();
        Self {
            position: Some(bounds.origin()),
            size: Some((bounds.width(), bounds.height())),
            points: match layer {
                Layer::Path(p) => Some(p.points.clone()),
                _ => None,
            },
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
