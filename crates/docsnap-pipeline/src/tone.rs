//! Fixed tone curve.
//!
//! After flat-fielding, paper sits high in the range but not at white. The
//! curve lifts the midtones hard and clips everything above 122 to white,
//! which makes the page look scanned rather than photographed.

use serde::{Deserialize, Serialize};

use crate::types::PixelBuffer;

/// Piecewise-linear curve through a set of control points, baked into a
/// 256-entry lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneCurve {
    lut: Vec<u8>,
}

impl ToneCurve {
    /// Control points of the document curve.
    pub const DOCUMENT_POINTS: [(u8, u8); 4] = [(0, 0), (82, 148), (122, 255), (255, 255)];

    /// Build a curve through `points`, interpolating linearly between
    /// consecutive points and rounding to the nearest integer.
    ///
    /// Points must be sorted by input. Inputs before the first point map
    /// to its output, inputs after the last to the last output.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_points(points: &[(u8, u8)]) -> Self {
        let lut = (0..=255u8)
            .map(|v| {
                let Some(upper) = points.iter().position(|&(x, _)| x >= v) else {
                    return points.last().map_or(v, |&(_, y)| y);
                };
                let (x1, y1) = points[upper];
                if upper == 0 || x1 == v {
                    return y1;
                }
                let (x0, y0) = points[upper - 1];
                let t = f64::from(v - x0) / f64::from(x1 - x0);
                t.mul_add(f64::from(y1) - f64::from(y0), f64::from(y0))
                    .round()
                    .clamp(0.0, 255.0) as u8
            })
            .collect();
        Self { lut }
    }

    /// The curve used for documents.
    #[must_use]
    pub fn document() -> Self {
        Self::from_points(&Self::DOCUMENT_POINTS)
    }

    /// Map one value through the curve.
    #[must_use]
    pub fn map(&self, value: u8) -> u8 {
        self.lut[usize::from(value)]
    }

    /// Apply the curve to every colour channel; alpha is untouched.
    #[must_use = "returns the tone-mapped buffer"]
    pub fn apply(&self, mut buffer: PixelBuffer) -> PixelBuffer {
        let n = buffer.channels().count();
        for px in buffer.as_raw_mut().chunks_exact_mut(n) {
            for c in px.iter_mut().take(3) {
                *c = self.lut[usize::from(*c)];
            }
        }
        buffer
    }
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self::document()
    }
}
