//! Text layer.

use super::{LayerTrait, Rgb};
use crate::geometry::point_in_rect;
use kurbo::{BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};

/// A free-standing line of plain text. `fill` is the text color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub fill: Rgb,
    #[serde(default)]
    pub value: String,
}

impl Text {
    pub fn new(position: Point, width: f64, height: f64, fill: Rgb) -> Self {
        Self {
            position,
            width,
            height,
            fill,
            value: String::new(),
        }
    }
}

impl LayerTrait for Text {
    fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        point_in_rect(point, self.bounds(), tolerance)
    }

    fn to_path(&self) -> BezPath {
        self.bounds().to_path(0.1)
    }

    fn fill(&self) -> Rgb {
        self.fill
    }

    fn set_fill(&mut self, fill: Rgb) {
        self.fill = fill;
    }

    fn set_bounds(&mut self, bounds: Rect) {
        self.position = bounds.origin();
        self.width = bounds.width();
        self.height = bounds.height();
    }
}
