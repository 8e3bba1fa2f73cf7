//! Flat-field illumination correction.
//!
//! Shadows and lamp fall-off vary slowly across the page while print
//! varies quickly. A large box mean of luma estimates the lighting field;
//! dividing by it and stretching the ratio to the full range leaves paper
//! uniformly bright and ink dark.

use image::GrayImage;
use tracing::{debug, instrument};

use crate::grayscale::to_luma;
use crate::types::PixelBuffer;

/// Ratio spans below this carry no contrast worth stretching; the image is
/// only flat-fielded.
pub const MIN_RATIO_SPAN: f64 = 0.1;

/// Summed-area table of an 8-bit plane.
///
/// `table[y * (width + 1) + x]` holds the sum of all pixels in
/// `[0, x) × [0, y)`; the first row and column are zero.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: u32,
    height: u32,
    table: Vec<u64>,
}

impl IntegralImage {
    /// Build the table for `gray`.
    #[must_use]
    pub fn new(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let stride = w as usize + 1;
        let mut table = vec![0u64; stride * (h as usize + 1)];
        for y in 0..h as usize {
            let mut row_sum = 0u64;
            for x in 0..w as usize {
                row_sum += u64::from(gray.as_raw()[y * w as usize + x]);
                table[(y + 1) * stride + x + 1] = row_sum + table[y * stride + x + 1];
            }
        }
        Self {
            width: w,
            height: h,
            table,
        }
    }

    /// Mean of the square window of the given radius centred on `(cx, cy)`,
    /// clamped to the image.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn window_mean(&self, cx: u32, cy: u32, radius: u32) -> f64 {
        let stride = self.width as usize + 1;
        let x1 = cx.saturating_sub(radius) as usize;
        let y1 = cy.saturating_sub(radius) as usize;
        let x2 = (cx.saturating_add(radius) as usize + 1).min(self.width as usize);
        let y2 = (cy.saturating_add(radius) as usize + 1).min(self.height as usize);
        let area = (x2 - x1) * (y2 - y1);
        if area == 0 {
            return 0.0;
        }
        let sum = self.table[y2 * stride + x2] + self.table[y1 * stride + x1]
            - self.table[y1 * stride + x2]
            - self.table[y2 * stride + x1];
        sum as f64 / area as f64
    }
}

/// Window radius for a given image size: half of
/// `kernel_fraction × longest side`, at least 1.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn window_radius(width: u32, height: u32, kernel_fraction: f64) -> u32 {
    let side = (f64::from(width.max(height)) * kernel_fraction).round() as u32;
    (side / 2).max(1)
}

/// Flat-field `buffer`, reusing its storage.
///
/// Luma `Y` is divided by `D = B + 1`, where `B` is the box mean of `Y`.
/// The ratio is renormalized from `[min, max]` to `[0, 255]` and the same
/// per-pixel divisor and stretch is applied to each colour channel. When
/// the ratio span is below [`MIN_RATIO_SPAN`] each channel becomes
/// `c · mean(D) / D` instead. Alpha is untouched.
#[must_use = "returns the corrected buffer"]
#[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn normalize_illumination(mut buffer: PixelBuffer, kernel_fraction: f64) -> PixelBuffer {
    let (w, h) = (buffer.width(), buffer.height());
    let luma = to_luma(&buffer);
    let integral = IntegralImage::new(&luma);
    let radius = window_radius(w, h, kernel_fraction);

    let mut divisors = Vec::with_capacity(w as usize * h as usize);
    let (mut min_ratio, mut max_ratio) = (f64::INFINITY, f64::NEG_INFINITY);
    let mut divisor_sum = 0.0;
    for y in 0..h {
        for x in 0..w {
            let d = integral.window_mean(x, y, radius) + 1.0;
            let ratio = f64::from(luma.get_pixel(x, y).0[0]) / d;
            min_ratio = min_ratio.min(ratio);
            max_ratio = max_ratio.max(ratio);
            divisor_sum += d;
            divisors.push(d);
        }
    }

    let span = max_ratio - min_ratio;
    let mean_divisor = divisor_sum / divisors.len().max(1) as f64;
    let stretch = span >= MIN_RATIO_SPAN;
    debug!(radius, min_ratio, max_ratio, stretch, "illumination field estimated");

    let n = buffer.channels().count();
    let data = buffer.as_raw_mut();
    for (px, &d) in data.chunks_exact_mut(n).zip(&divisors) {
        for c in px.iter_mut().take(3) {
            let value = if stretch {
                (f64::from(*c) / d - min_ratio) / span * 255.0
            } else {
                f64::from(*c) * mean_divisor / d
            };
            *c = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    buffer
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Channels;

    #[test]
    fn window_mean_matches_brute_force() {
        let gray = GrayImage::from_fn(9, 7, |x, y| image::Luma([(x * 13 + y * 29) as u8]));
        let integral = IntegralImage::new(&gray);
        for (cx, cy, r) in [(0u32, 0u32, 1u32), (4, 3, 2), (8, 6, 3), (5, 1, 10)] {
            let x_range = cx.saturating_sub(r)..=(cx + r).min(8);
            let y_range = cy.saturating_sub(r)..=(cy + r).min(6);
            let mut sum = 0.0;
            let mut count = 0.0;
            for y in y_range {
                for x in x_range.clone() {
                    sum += f64::from(gray.get_pixel(x, y).0[0]);
                    count += 1.0;
                }
            }
            let expected = sum / count;
            let got = integral.window_mean(cx, cy, r);
            assert!((got - expected).abs() < 1e-9, "({cx},{cy},{r}): {got} vs {expected}");
        }
    }

    #[test]
    fn radius_follows_kernel_fraction() {
        assert_eq!(window_radius(1600, 1200, 0.0625), 50);
        assert_eq!(window_radius(10, 10, 0.0625), 1);
    }

    #[test]
    fn uniform_gray_is_unchanged() {
        let buffer = PixelBuffer::filled(64, 48, [128, 128, 128]);
        let out = normalize_illumination(buffer.clone(), 0.0625);
        for (a, b) in out.as_raw().iter().zip(buffer.as_raw()) {
            assert!(a.abs_diff(*b) <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn shadow_gradient_is_flattened() {
        // Paper lit from the right: brightness falls from 200 to 110.
        let buffer = PixelBuffer::from_fn_rgb(320, 200, |x, y| {
            let shade = 0.55 + 0.45 * f64::from(x) / 319.0;
            let ink = y % 40 < 3 && (20..300).contains(&x);
            let base = if ink { 30.0 } else { 200.0 };
            let v = (base * shade).round() as u8;
            [v, v, v]
        });
        let before = i32::from(buffer.rgb(305, 20)[0]) - i32::from(buffer.rgb(10, 20)[0]);
        let out = normalize_illumination(buffer, 0.0625);

        let left = out.rgb(10, 20)[0];
        let right = out.rgb(305, 20)[0];
        assert!(before > 60, "fixture should start uneven, got {before}");
        assert!(left.abs_diff(right) < 15, "paper still uneven: {left} vs {right}");
        assert!(out.rgb(100, 41)[0] < 100, "ink should stay dark");
    }

    #[test]
    fn alpha_is_untouched() {
        let data: Vec<u8> = (0..16 * 16).flat_map(|i| [(i % 200) as u8, 90, 60, 33]).collect();
        let buffer = PixelBuffer::from_raw(16, 16, Channels::Rgba, data).unwrap();
        let out = normalize_illumination(buffer, 0.25);
        assert!(out.as_raw().chunks_exact(4).all(|px| px[3] == 33));
    }
}
