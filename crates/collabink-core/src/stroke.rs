//! Freehand stroke accumulation.

use crate::geometry::stroke_bounds;
use crate::layers::{Path, Rgb, StrokePoint};
use kurbo::Point;

/// An in-progress freehand stroke in canvas coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeDraft {
    points: Vec<StrokePoint>,
    color: Rgb,
}

impl StrokeDraft {
    /// Begin a stroke at `point`.
    pub fn start(point: Point, pressure: f64, color: Rgb) -> Self {
        Self {
            points: vec![StrokePoint::new(point.x, point.y, pressure)],
            color,
        }
    }

    /// Append a sample. A sample at the same place as the previous one is skipped.
    pub fn continue_to(&mut self, point: Point, pressure: f64) -> bool {
        if self.points.last().is_some_and(|last| last.point() == point) {
            return false;
        }
        self.points.push(StrokePoint::new(point.x, point.y, pressure));
        true
    }

    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Turn the draft into a Path layer.
    ///
    /// Fewer than two samples produce nothing. The path box is the min/max of the
    /// samples and the stored points are relative to its top-left corner.
    pub fn finalize(self, stroke_width: f64) -> Option<Path> {
        if self.points.len() < 2 {
            return None;
        }
        let bounds = stroke_bounds(&self.points)?;
        let origin = bounds.origin();
        let points = self
            .points
            .iter()
            .map(|p| StrokePoint::new(p.x - origin.x, p.y - origin.y, p.pressure))
            .collect();
        Some(Path::new(
            origin,
            bounds.width(),
            bounds.height(),
            self.color,
            points,
            stroke_width,
        ))
    }
}
