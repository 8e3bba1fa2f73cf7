//! Four-point homography solve and projection.
//!
//! With exactly four correspondences the DLT system is square: fixing
//! `h33 = 1` leaves eight unknowns and eight equations, solved here with
//! an LU decomposition. Both point sets are Hartley-normalized first so
//! the system stays well conditioned for multi-megapixel coordinates.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::types::{PipelineError, Point};

/// A 3×3 projective transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    /// Solve for the homography mapping each `src[i]` onto `dst[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateQuad`] if the system is singular
    /// (three collinear points on either side).
    pub fn from_correspondences(src: &[Point; 4], dst: &[Point; 4]) -> Result<Self, PipelineError> {
        if has_collinear_triple(src) || has_collinear_triple(dst) {
            return Err(PipelineError::DegenerateQuad);
        }

        let (t_src, src_n) = normalize(src);
        let (t_dst, dst_n) = normalize(dst);

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
            let r = 2 * i;
            // u = (h11 x + h12 y + h13) / (h31 x + h32 y + 1)
            a[(r, 0)] = s.x;
            a[(r, 1)] = s.y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -d.x * s.x;
            a[(r, 7)] = -d.x * s.y;
            b[r] = d.x;
            // v = (h21 x + h22 y + h23) / (h31 x + h32 y + 1)
            a[(r + 1, 3)] = s.x;
            a[(r + 1, 4)] = s.y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -d.y * s.x;
            a[(r + 1, 7)] = -d.y * s.y;
            b[r + 1] = d.y;
        }

        let h = a.lu().solve(&b).ok_or(PipelineError::DegenerateQuad)?;
        if h.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::DegenerateQuad);
        }

        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let t_dst_inv = t_dst.try_inverse().ok_or(PipelineError::DegenerateQuad)?;
        let m = t_dst_inv * normalized * t_src;
        if m[(2, 2)].abs() < 1e-15 {
            return Err(PipelineError::DegenerateQuad);
        }
        Ok(Self(m / m[(2, 2)]))
    }

    /// The inverse transform.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateQuad`] if the matrix is singular.
    pub fn inverse(&self) -> Result<Self, PipelineError> {
        self.0
            .try_inverse()
            .map(Self)
            .ok_or(PipelineError::DegenerateQuad)
    }

    /// Map a point through the transform.
    ///
    /// Returns `None` for points on the line at infinity.
    #[must_use]
    pub fn project(&self, p: Point) -> Option<Point> {
        let v = self.0 * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        Some(Point::new(v[0] / v[2], v[1] / v[2]))
    }

    /// The underlying matrix.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }
}

/// Similarity transform moving the centroid to the origin with a mean
/// distance of sqrt(2), and the transformed points.
fn normalize(points: &[Point; 4]) -> (Matrix3<f64>, [Point; 4]) {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let centroid = Point::new(cx, cy);
    let mean_dist = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / 4.0;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    (t, points.map(|p| Point::new(s * (p.x - cx), s * (p.y - cy))))
}

/// `true` if any three of the four points are (nearly) collinear.
fn has_collinear_triple(points: &[Point; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[i, j, k]| {
        let (a, b, c) = (points[i], points[j], points[k]);
        let cross = (b.x - a.x).mul_add(c.y - a.y, -((b.y - a.y) * (c.x - a.x)));
        let scale = a.distance(b) * a.distance(c);
        scale < 1e-12 || cross.abs() / scale < 1e-6
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point) {
        assert!(a.distance(b) < 1e-6, "expected {b:?}, got {a:?}");
    }

    fn skewed() -> [Point; 4] {
        [
            Point::new(112.0, 80.5),
            Point::new(905.0, 140.0),
            Point::new(860.0, 1210.0),
            Point::new(60.0, 1130.0),
        ]
    }

    fn target() -> [Point; 4] {
        [
            Point::new(0.0, 0.0),
            Point::new(800.0, 0.0),
            Point::new(800.0, 1075.0),
            Point::new(0.0, 1075.0),
        ]
    }

    #[test]
    fn maps_the_four_corners_exactly() {
        let h = Homography::from_correspondences(&skewed(), &target()).unwrap();
        for (s, d) in skewed().iter().zip(target()) {
            assert_close(h.project(*s).unwrap(), d);
        }
    }

    #[test]
    fn inverse_maps_back() {
        let h = Homography::from_correspondences(&skewed(), &target()).unwrap();
        let inv = h.inverse().unwrap();
        for (s, d) in skewed().iter().zip(target()) {
            assert_close(inv.project(d).unwrap(), *s);
        }
    }

    #[test]
    fn identity_for_identical_quads() {
        let h = Homography::from_correspondences(&target(), &target()).unwrap();
        assert_close(h.project(Point::new(123.0, 456.0)).unwrap(), Point::new(123.0, 456.0));
    }

    #[test]
    fn collinear_source_is_degenerate() {
        let line = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ];
        let result = Homography::from_correspondences(&line, &target());
        assert!(matches!(result, Err(PipelineError::DegenerateQuad)));
    }
}
