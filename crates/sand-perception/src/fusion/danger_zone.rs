//! Polygon membership in the fusion frame.

use sand_types::Point;

const EPSILON: f64 = 1e-9;

/// One category (objects or persons) of danger-zone polygons, in output
/// pixels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DangerZone {
    polygons: Vec<Vec<Point>>,
}

impl DangerZone {
    /// Polygons with fewer than three vertices are dropped.
    pub fn new(polygons: Vec<Vec<Point>>) -> Self {
        Self {
            polygons: polygons.into_iter().filter(|p| p.len() >= 3).collect(),
        }
    }

    pub fn polygons(&self) -> &[Vec<Point>] {
        &self.polygons
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// True when `point` is inside or on the boundary of any polygon.
    pub fn contains(&self, point: Point) -> bool {
        self.polygons.iter().any(|polygon| polygon_contains(polygon, point))
    }
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPSILON * (1.0 + (b.x - a.x).abs() + (b.y - a.y).abs()) {
        return false;
    }
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Even-odd ray cast; points on an edge count as inside.
fn polygon_contains(polygon: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
