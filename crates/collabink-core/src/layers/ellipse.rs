//! Ellipse layer.

use super::{LayerTrait, Rgb};
use kurbo::{BezPath, Ellipse as KurboEllipse, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};

/// An ellipse inscribed in its bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    /// Top-left corner of the bounding box.
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub fill: Rgb,
}

impl Ellipse {
    pub fn new(position: Point, width: f64, height: f64, fill: Rgb) -> Self {
        Self {
            position,
            width,
            height,
            fill,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.position.x + self.width / 2.0, self.position.y + self.height / 2.0)
    }

    /// Get as a kurbo Ellipse.
    pub fn as_kurbo(&self) -> KurboEllipse {
        KurboEllipse::from_rect(self.bounds())
    }
}

impl LayerTrait for Ellipse {
    fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let center = self.center();
        let rx = self.width / 2.0 + tolerance;
        let ry = self.height / 2.0 + tolerance;
        if rx < f64::EPSILON || ry < f64::EPSILON {
            return false;
        }
        let dx = (point.x - center.x) / rx;
        let dy = (point.y - center.y) / ry;
        dx * dx + dy * dy <= 1.0
    }

    fn to_path(&self) -> BezPath {
        self.as_kurbo().to_path(0.1)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipse_center() {
        let ellipse = Ellipse::new(Point::new(0.0, 0.0), 100.0, 50.0, Rgb::new(0, 0, 0));
        assert_eq!(ellipse.center(), Point::new(50.0, 25.0));
    }

    #[test]
    fn test_hit_test_excludes_box_corners() {
        let ellipse = Ellipse::new(Point::new(0.0, 0.0), 100.0, 100.0, Rgb::new(0, 0, 0));
        assert!(ellipse.hit_test(Point::new(50.0, 50.0), 0.0));
        assert!(ellipse.hit_test(Point::new(50.0, 1.0), 0.0));
        // Inside the bounding box but outside the curve.
        assert!(!ellipse.hit_test(Point::new(2.0, 2.0), 0.0));
        assert!(ellipse.hit_test(Point::new(105.0, 50.0), 10.0));
    }
}
