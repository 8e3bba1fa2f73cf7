//! Outline simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! The quad fitter runs this on the convex hull of each region; a page
//! collapses to its four corners once the tolerance exceeds the pixel
//! staircase along its edges.

use crate::types::Point;

/// Simplify an open polyline using the Ramer-Douglas-Peucker algorithm.
///
/// Points within `tolerance` pixels of the line between their endpoints
/// are removed. A tolerance of 0.0 preserves all points. Polylines with
/// fewer than 3 points are returned unchanged.
#[must_use = "returns the simplified polyline"]
pub fn simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;

    rdp_recurse(points, 0, points.len() - 1, tolerance, &mut kept);

    points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

/// Simplify a closed ring.
///
/// The ring is split at two far-apart vertices (the farthest vertex from
/// the first one, and the farthest vertex from that) and each half is
/// simplified as an open polyline. The result is an open ring with no
/// repeated end point.
#[must_use = "returns the simplified ring"]
pub fn simplify_closed(ring: &[Point], tolerance: f64) -> Vec<Point> {
    let n = ring.len();
    if n < 4 {
        return ring.to_vec();
    }

    let farthest_from = |origin: Point| {
        (0..n)
            .max_by(|&i, &j| {
                origin
                    .distance_squared(ring[i])
                    .total_cmp(&origin.distance_squared(ring[j]))
            })
            .unwrap_or(0)
    };
    let a = farthest_from(ring[0]);
    let b = farthest_from(ring[a]);
    if a == b {
        return vec![ring[a]];
    }

    let chain = |from: usize, to: usize| -> Vec<Point> {
        let len = (to + n - from) % n + 1;
        (0..len).map(|k| ring[(from + k) % n]).collect()
    };

    let mut first = simplify(&chain(a, b), tolerance);
    let second = simplify(&chain(b, a), tolerance);
    // Both halves share their end points; keep each once.
    first.pop();
    first.extend_from_slice(&second[..second.len() - 1]);
    first
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// line segment between them. If that distance exceeds `tolerance`, the
/// point is kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line defined by `a` and `b`.
///
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_polylines_unchanged() {
        assert!(simplify(&[], 1.0).is_empty());
        let two = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        assert_eq!(simplify(&two, 1.0).len(), 2);
    }

    #[test]
    fn collinear_points_collapse_to_endpoints() {
        let line: Vec<Point> = (0..5).map(|i| Point::new(f64::from(i), f64::from(i))).collect();
        let result = simplify(&line, 0.1);
        assert_eq!(result, vec![Point::new(0.0, 0.0), Point::new(4.0, 4.0)]);
    }

    #[test]
    fn zigzag_retains_peaks_below_tolerance() {
        let zigzag = [
            Point::new(0.0, 0.0),
            Point::new(2.0, 5.0),
            Point::new(4.0, 0.0),
            Point::new(6.0, 5.0),
            Point::new(8.0, 0.0),
        ];
        assert_eq!(simplify(&zigzag, 1.0).len(), 5);
        assert_eq!(simplify(&zigzag, 10.0).len(), 2);
    }

    #[test]
    fn closed_ring_with_edge_points_collapses_to_corners() {
        // A 40×20 rectangle sampled every 5 px along its edges.
        let mut ring = Vec::new();
        for x in (0..40).step_by(5) {
            ring.push(Point::new(f64::from(x), 0.0));
        }
        for y in (0..20).step_by(5) {
            ring.push(Point::new(40.0, f64::from(y)));
        }
        for x in (1..=40).rev().step_by(5) {
            ring.push(Point::new(f64::from(x), 20.0));
        }
        for y in (1..=20).rev().step_by(5) {
            ring.push(Point::new(0.0, f64::from(y)));
        }
        let simplified = simplify_closed(&ring, 2.0);
        assert_eq!(simplified.len(), 4, "got {simplified:?}");
        for corner in [
            Point::new(0.0, 0.0),
            Point::new(40.0, 0.0),
            Point::new(40.0, 20.0),
        ] {
            assert!(simplified.contains(&corner), "missing {corner:?}");
        }
    }

    #[test]
    fn perpendicular_distance_diagonal_segment() {
        // Point (2, -1) is 8 / sqrt(20) from the line (0,0)->(4,2).
        let d = perpendicular_distance(
            Point::new(2.0, -1.0),
            Point::new(0.0, 0.0),
            Point::new(4.0, 2.0),
        );
        let expected = 8.0 / 20.0_f64.sqrt();
        assert!((d - expected).abs() < 1e-10, "got {d}, expected {expected}");
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            Point::new(3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-10);
    }
}
