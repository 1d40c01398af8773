//! Pure geometry helpers: box overlap, hit distances, resize math and stroke outlines.

use crate::layers::{Rgb, StrokePoint};
use crate::selection::ResizeHandle;
use kurbo::{BezPath, Circle, Point, Rect, Shape as KurboShape};

/// How far pressure thins a stroke (0 = constant width).
const STROKE_THINNING: f64 = 0.5;
/// Smallest outline radius, so zero-pressure samples stay visible.
const MIN_STROKE_RADIUS: f64 = 0.5;
/// Luminance above which dark text is used on a fill.
const CONTRAST_LUMINANCE_THRESHOLD: f64 = 182.0;

/// Build a normalized rectangle from two arbitrary corner points.
pub fn rect_from_points(a: Point, b: Point) -> Rect {
    Rect::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
}

/// Axis-aligned overlap test with `tolerance` added to every side of `a`.
/// Touching edges count as overlap.
pub fn rects_overlap(a: Rect, b: Rect, tolerance: f64) -> bool {
    let a = a.inflate(tolerance, tolerance);
    a.x0 <= b.x1 && a.x1 >= b.x0 && a.y0 <= b.y1 && a.y1 >= b.y0
}

/// Check whether `point` lies inside `rect` grown by `tolerance`.
pub fn point_in_rect(point: Point, rect: Rect, tolerance: f64) -> bool {
    let r = rect.inflate(tolerance, tolerance);
    point.x >= r.x0 && point.x <= r.x1 && point.y >= r.y0 && point.y <= r.y1
}

/// Sum of the absolute axis distances between two points.
pub fn manhattan_distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = a + seg * t;
    (point - proj).hypot()
}

/// Minimum distance from a point to a polyline.
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    match points {
        [] => f64::INFINITY,
        [single] => (point - *single).hypot(),
        _ => points
            .windows(2)
            .map(|w| point_to_segment_dist(point, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Bounding box of a set of stroke samples, or `None` when empty.
pub fn stroke_bounds(points: &[StrokePoint]) -> Option<Rect> {
    let first = points.first()?;
    let mut rect = Rect::new(first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        rect.x0 = rect.x0.min(p.x);
        rect.y0 = rect.y0.min(p.y);
        rect.x1 = rect.x1.max(p.x);
        rect.y1 = rect.y1.max(p.y);
    }
    Some(rect)
}

/// Compute the bounds produced by dragging `handle` of `initial` to `point`.
///
/// Only the edges the handle controls follow the pointer. Both dimensions are
/// clamped to `min_size`; a dragged edge stops at the floor instead of crossing
/// the opposite edge.
pub fn resize_bounds(initial: Rect, handle: ResizeHandle, point: Point, min_size: f64) -> Rect {
    let Rect { mut x0, mut y0, mut x1, mut y1 } = initial;

    if handle.moves_left() {
        x0 = point.x.min(x1 - min_size);
    }
    if handle.moves_right() {
        x1 = point.x.max(x0 + min_size);
    }
    if handle.moves_top() {
        y0 = point.y.min(y1 - min_size);
    }
    if handle.moves_bottom() {
        y1 = point.y.max(y0 + min_size);
    }

    // Boxes that started below the floor (thin strokes) are grown on the dragged side.
    if x1 - x0 < min_size {
        if handle.moves_left() {
            x0 = x1 - min_size;
        } else {
            x1 = x0 + min_size;
        }
    }
    if y1 - y0 < min_size {
        if handle.moves_top() {
            y0 = y1 - min_size;
        } else {
            y1 = y0 + min_size;
        }
    }

    Rect::new(x0, y0, x1, y1)
}

fn stroke_radius(width: f64, pressure: f64) -> f64 {
    let pressure = pressure.clamp(0.0, 1.0);
    (width * (0.5 - STROKE_THINNING * (0.5 - pressure))).max(MIN_STROKE_RADIUS)
}

/// Compute the closed outline polygon of a pressure-sensitive stroke.
///
/// `origin` is added to every sample, so box-local points can be drawn in place.
pub fn stroke_outline(points: &[StrokePoint], origin: Point, width: f64) -> Vec<Point> {
    if points.len() < 2 {
        return Vec::new();
    }

    let abs: Vec<Point> = points
        .iter()
        .map(|p| Point::new(origin.x + p.x, origin.y + p.y))
        .collect();

    let mut left = Vec::with_capacity(abs.len());
    let mut right = Vec::with_capacity(abs.len());

    for i in 0..abs.len() {
        let prev = abs[i.saturating_sub(1)];
        let next = abs[(i + 1).min(abs.len() - 1)];
        let dir = next - prev;
        let len = dir.hypot();
        let normal = if len < f64::EPSILON {
            kurbo::Vec2::ZERO
        } else {
            kurbo::Vec2::new(-dir.y / len, dir.x / len)
        };
        let r = stroke_radius(width, points[i].pressure);
        left.push(abs[i] + normal * r);
        right.push(abs[i] - normal * r);
    }

    right.reverse();
    left.extend(right);
    left
}

/// Smooth an outline polygon into a closed path of quadratic segments through
/// the midpoints of consecutive vertices.
pub fn outline_to_path(outline: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let Some(&first) = outline.first() else {
        return path;
    };

    path.move_to(first);
    for (i, &p) in outline.iter().enumerate() {
        let next = outline[(i + 1) % outline.len()];
        path.quad_to(p, p.midpoint(next));
    }
    path.close_path();
    path
}

/// Convert stroke samples into a fillable path.
///
/// Used for finalized Path layers and for other participants' live strokes, so
/// both render identically. A single sample becomes a dot.
pub fn stroke_to_path(points: &[StrokePoint], origin: Point, width: f64) -> BezPath {
    match points {
        [] => BezPath::new(),
        [p] => {
            let center = Point::new(origin.x + p.x, origin.y + p.y);
            Circle::new(center, stroke_radius(width, p.pressure)).to_path(0.1)
        }
        _ => outline_to_path(&stroke_outline(points, origin, width)),
    }
}

/// Pick black or white text for legibility on `fill`.
pub fn contrasting_text_color(fill: Rgb) -> Rgb {
    let luminance = f64::from(fill.r) * 0.299 + f64::from(fill.g) * 0.587 + f64::from(fill.b) * 0.114;
    if luminance > CONTRAST_LUMINANCE_THRESHOLD {
        Rgb::new(0, 0, 0)
    } else {
        Rgb::new(255, 255, 255)
    }
}
