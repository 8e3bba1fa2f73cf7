//! Small polygon helpers: area, perimeter, convex hull, convexity.

use geo::ConvexHull;

use crate::types::Point;

/// Absolute enclosed area of a closed polygon (shoelace formula).
#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    signed_area(points).abs()
}

/// Signed shoelace area; positive when the vertices run clockwise in
/// image coordinates (y down).
#[must_use]
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x.mul_add(b.y, -(b.x * a.y)))
        .sum();
    twice / 2.0
}

/// Length of the closed ring through `points`.
#[must_use]
pub fn perimeter(points: &[Point]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.distance(*b))
        .sum()
}

/// Convex hull of a point cloud as an open ring (no repeated end point).
#[must_use = "returns the hull vertices"]
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let cloud: geo::MultiPoint<f64> = points
        .iter()
        .map(|p| geo::Point::new(p.x, p.y))
        .collect();
    let hull = cloud.convex_hull();
    let mut ring: Vec<Point> = hull
        .exterior()
        .points()
        .map(|p| Point::new(p.x(), p.y()))
        .collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// `true` when the ring turns the same way at every vertex and no three
/// consecutive vertices are collinear.
#[must_use]
pub fn is_strictly_convex(points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0_f64;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let cross = (b.x - a.x).mul_add(c.y - b.y, -((b.y - a.y) * (c.x - b.x)));
        if cross.abs() < 1e-9 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}
