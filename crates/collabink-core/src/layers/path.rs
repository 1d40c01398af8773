//! Freehand path layer.

use super::{LayerTrait, Rgb};
use crate::geometry::{point_to_polyline_dist, stroke_to_path};
use kurbo::{BezPath, Point, Rect};
use serde::{Deserialize, Serialize};

/// One pressure-sensitive sample of a freehand stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    /// Pen pressure in `0.0..=1.0`.
    pub pressure: f64,
}

impl StrokePoint {
    pub const fn new(x: f64, y: f64, pressure: f64) -> Self {
        Self { x, y, pressure }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A finalized freehand stroke. Points are relative to `position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub fill: Rgb,
    pub points: Vec<StrokePoint>,
    pub stroke_width: f64,
}

impl Path {
    pub fn new(position: Point, width: f64, height: f64, fill: Rgb, points: Vec<StrokePoint>, stroke_width: f64) -> Self {
        Self {
            position,
            width,
            height,
            fill,
            points,
            stroke_width,
        }
    }

    /// Points translated into canvas coordinates.
    pub fn absolute_points(&self) -> Vec<Point> {
        self.points
            .iter()
            .map(|p| Point::new(self.position.x + p.x, self.position.y + p.y))
            .collect()
    }
}

impl LayerTrait for Path {
    fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let abs = self.absolute_points();
        if abs.is_empty() {
            return false;
        }
        point_to_polyline_dist(point, &abs) <= tolerance + self.stroke_width / 2.0
    }

    fn to_path(&self) -> BezPath {
        stroke_to_path(&self.points, self.position, self.stroke_width)
    }

    fn fill(&self) -> Rgb {
        self.fill
    }

    fn set_fill(&mut self, fill: Rgb) {
        self.fill = fill;
    }

    /// Points are scaled along with the box. A zero-sized axis (straight line) is left as is.
    fn set_bounds(&mut self, bounds: Rect) {
        let sx = if self.width > f64::EPSILON { bounds.width() / self.width } else { 1.0 };
        let sy = if self.height > f64::EPSILON { bounds.height() / self.height } else { 1.0 };
        for p in &mut self.points {
            p.x *= sx;
            p.y *= sy;
        }
        self.position = bounds.origin();
        self.width = bounds.width();
        self.height = bounds.height();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Path {
        Path::new(
            Point::new(10.0, 10.0),
            10.0,
            10.0,
            Rgb::new(0, 0, 0),
            vec![
                StrokePoint::new(0.0, 0.0, 0.5),
                StrokePoint::new(10.0, 0.0, 0.5),
                StrokePoint::new(10.0, 10.0, 0.5),
            ],
            8.0,
        )
    }

    #[test]
    fn test_hit_test_follows_polyline() {
        let path = sample();
        // On the first segment.
        assert!(path.hit_test(Point::new(15.0, 10.0), 0.0));
        // Inside the box but away from the stroke.
        assert!(!path.hit_test(Point::new(10.0, 20.0), 0.0));
        assert!(path.hit_test(Point::new(10.0, 20.0), 10.0));
    }

    #[test]
    fn test_set_bounds_scales_points() {
        let mut path = sample();
        path.set_bounds(Rect::new(0.0, 0.0, 20.0, 40.0));
        assert_eq!(path.points[1], StrokePoint::new(20.0, 0.0, 0.5));
        assert_eq!(path.points[2], StrokePoint::new(20.0, 40.0, 0.5));
        assert!((path.width - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_to_path_is_not_empty() {
        let path = sample();
        assert!(!path.to_path().elements().is_empty());
    }
}
