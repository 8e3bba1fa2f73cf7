//! Orientation selection by directional gradient energy.
//!
//! Printed documents are dominated by horizontal structure: text lines,
//! table rules, underlines. For each of the four right-angle rotations we
//! measure how much more vertical-gradient (horizontal-edge) energy there
//! is than horizontal-gradient energy and keep the best candidate.
//!
//! The score is symmetric under 180°, so 0° and 180° always tie, as do
//! 90° and 270°. The visiting order and the portrait tie-break make the
//! choice deterministic.

use image::{GenericImageView, GrayImage, ImageBuffer, Pixel, Rgb, Rgba, imageops};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::blur::gaussian_blur;
use crate::downsample::downsample;
use crate::grayscale::to_luma;
use crate::types::{Channels, Dimensions, PipelineConfig, PixelBuffer, Rotation};

/// Sobel kernels sum to 4 on each side; dividing by 4 puts the response in
/// 0–255 luma units.
const SOBEL_NORMALIZATION: f64 = 4.0;

/// Score of one candidate rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// The rotation that was scored.
    pub rotation: Rotation,
    /// Mean horizontal-edge response minus mean vertical-edge response.
    pub score: f64,
    /// Dimensions of the full-resolution result for this rotation.
    pub dimensions: Dimensions,
}

/// The selected rotation and the rotated buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationResult {
    /// Chosen clockwise rotation.
    pub rotation: Rotation,
    /// Score of the chosen rotation.
    pub score: f64,
    /// The rotated full-resolution buffer.
    pub buffer: PixelBuffer,
    /// Every candidate in visiting order (empty when scoring was disabled).
    pub candidates: Vec<CandidateScore>,
}

/// Rotate a buffer clockwise by an exact multiple of 90°.
#[must_use = "returns the rotated buffer"]
pub fn rotate(buffer: &PixelBuffer, rotation: Rotation) -> PixelBuffer {
    let (w, h) = (buffer.width(), buffer.height());
    let raw = buffer.as_raw();
    let turned = match buffer.channels() {
        Channels::Rgb => ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(w, h, raw)
            .and_then(|view| turn(&view, rotation)),
        Channels::Rgba => ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(w, h, raw)
            .and_then(|view| turn(&view, rotation)),
    };
    let (out_w, out_h) = if rotation.swaps_axes() { (h, w) } else { (w, h) };
    turned
        .and_then(|data| PixelBuffer::from_raw(out_w, out_h, buffer.channels(), data).ok())
        .unwrap_or_else(|| buffer.clone())
}

/// Raw bytes of `image` after a non-zero rotation, `None` for [`Rotation::R0`].
fn turn<I>(image: &I, rotation: Rotation) -> Option<Vec<u8>>
where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8> + 'static,
{
    let turned = match rotation {
        Rotation::R0 => return None,
        Rotation::R90 => imageops::rotate90(image),
        Rotation::R180 => imageops::rotate180(image),
        Rotation::R270 => imageops::rotate270(image),
    };
    Some(turned.into_raw())
}

/// Rotate a luma plane clockwise by an exact multiple of 90°.
#[must_use = "returns the rotated plane"]
pub fn rotate_luma(image: &GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::R0 => image.clone(),
        Rotation::R90 => imageops::rotate90(image),
        Rotation::R180 => imageops::rotate180(image),
        Rotation::R270 => imageops::rotate270(image),
    }
}

/// Mean horizontal-edge response minus mean vertical-edge response.
///
/// Horizontal edges (rows of text) show up in the vertical Sobel
/// derivative. Positive scores mean predominantly horizontal structure.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn orientation_score(luma: &GrayImage) -> f64 {
    let pixels = u64::from(luma.width()) * u64::from(luma.height());
    if pixels == 0 {
        return 0.0;
    }
    let horizontal_edges = imageproc::gradients::vertical_sobel(luma);
    let vertical_edges = imageproc::gradients::horizontal_sobel(luma);
    let energy = |gradient: &ImageBuffer<image::Luma<i16>, Vec<i16>>| {
        gradient
            .pixels()
            .map(|p| u64::from(p.0[0].unsigned_abs()))
            .sum::<u64>() as f64
            / SOBEL_NORMALIZATION
            / pixels as f64
    };
    energy(&horizontal_edges) - energy(&vertical_edges)
}

/// `true` if `candidate` should replace `best`.
///
/// A candidate wins outright when it beats the best score by more than
/// `epsilon`. Within `epsilon`, a portrait candidate replaces a landscape
/// best when `prefer_portrait` is set.
#[must_use]
pub fn replaces(
    candidate: &CandidateScore,
    best: &CandidateScore,
    epsilon: f64,
    prefer_portrait: bool,
) -> bool {
    if candidate.score > best.score + epsilon {
        return true;
    }
    prefer_portrait
        && (candidate.score - best.score).abs() <= epsilon
        && candidate.dimensions.is_portrait()
        && !best.dimensions.is_portrait()
}

/// Score every rotation on a working-resolution copy and apply the winner
/// to the full-resolution buffer.
#[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
pub fn select_orientation(buffer: PixelBuffer, config: &PipelineConfig) -> OrientationResult {
    let luma = to_luma(&buffer);
    let (working, _) = downsample(&luma, config.working_resolution, config.downsample_filter);
    let smoothed = gaussian_blur(&working, config.orientation_blur_sigma);

    let dims = buffer.dimensions();
    let candidates: Vec<CandidateScore> = Rotation::ALL
        .iter()
        .map(|&rotation| CandidateScore {
            rotation,
            score: orientation_score(&rotate_luma(&smoothed, rotation)),
            dimensions: if rotation.swaps_axes() {
                Dimensions::new(dims.height, dims.width)
            } else {
                dims
            },
        })
        .collect();

    // A featureless frame has no upright; keep it as captured.
    let structured = candidates
        .iter()
        .any(|c| c.score.abs() > config.orientation_epsilon);
    let prefer_portrait = config.prefer_portrait && structured;

    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if replaces(
            candidate,
            &best,
            config.orientation_epsilon,
            prefer_portrait,
        ) {
            best = *candidate;
        }
    }
    debug!(
        rotation = best.rotation.degrees(),
        score = best.score,
        scores = ?candidates.iter().map(|c| c.score).collect::<Vec<_>>(),
        "orientation selected",
    );

    let buffer = if best.rotation == Rotation::R0 {
        buffer
    } else {
        rotate(&buffer, best.rotation)
    };
    OrientationResult {
        rotation: best.rotation,
        score: best.score,
        buffer,
        candidates,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Landscape page with dark horizontal rules every 8 rows.
    fn ruled_page() -> PixelBuffer {
        PixelBuffer::from_fn_rgb(160, 96, |x, y| {
            if y % 8 < 2 && (8..152).contains(&x) {
                [20, 20, 20]
            } else {
                [235, 235, 235]
            }
        })
    }

    fn candidate(score: f64, w: u32, h: u32) -> CandidateScore {
        CandidateScore {
            rotation: Rotation::R0,
            score,
            dimensions: Dimensions::new(w, h),
        }
    }

    #[test]
    fn rotations_compose() {
        let page = ruled_page();
        let quarter = rotate(&page, Rotation::R90);
        assert_eq!(quarter.dimensions(), Dimensions::new(96, 160));
        assert_eq!(rotate(&quarter, Rotation::R270), page);
        assert_eq!(rotate(&rotate(&page, Rotation::R180), Rotation::R180), page);
    }

    #[test]
    fn quarter_turn_keeps_alpha_and_moves_corner() {
        let mut data = vec![0u8; 3 * 2 * 4];
        data[..4].copy_from_slice(&[10, 20, 30, 40]);
        let page = PixelBuffer::from_raw(3, 2, Channels::Rgba, data).unwrap();
        let turned = rotate(&page, Rotation::R90);
        assert_eq!(turned.dimensions(), Dimensions::new(2, 3));
        assert_eq!(turned.channels(), Channels::Rgba);
        // Clockwise: the top-left pixel ends up top-right.
        assert_eq!(turned.pixel(1, 0), &[10, 20, 30, 40]);
        assert_eq!(rotate(&turned, Rotation::R270), page);
    }

    #[test]
    fn horizontal_lines_score_positive() {
        let luma = to_luma(&ruled_page());
        let upright = orientation_score(&luma);
        let sideways = orientation_score(&rotate_luma(&luma, Rotation::R90));
        assert!(upright > 2.0, "upright score {upright}");
        assert!(sideways < -2.0, "sideways score {sideways}");
    }

    #[test]
    fn uniform_image_scores_zero() {
        let luma = GrayImage::from_pixel(40, 30, image::Luma([128]));
        assert!(orientation_score(&luma).abs() < f64::EPSILON);
    }

    #[test]
    fn quarter_turned_page_is_restored() {
        let original = ruled_page();
        let turned = rotate(&original, Rotation::R270);
        let result = select_orientation(turned, &PipelineConfig::default());
        assert_eq!(result.rotation, Rotation::R90);
        assert_eq!(result.buffer, original);
        assert_eq!(result.candidates.len(), 4);
    }

    #[test]
    fn upright_page_is_left_alone() {
        let original = ruled_page();
        let result = select_orientation(original.clone(), &PipelineConfig::default());
        assert_eq!(result.rotation, Rotation::R0);
        assert_eq!(result.buffer, original);
    }

    #[test]
    fn featureless_landscape_frame_is_not_turned() {
        let flat = PixelBuffer::filled(80, 50, [200, 200, 200]);
        let result = select_orientation(flat.clone(), &PipelineConfig::default());
        assert_eq!(result.rotation, Rotation::R0);
        assert_eq!(result.buffer, flat);
    }

    #[test]
    fn clear_winner_replaces_best() {
        assert!(replaces(&candidate(10.0, 4, 3), &candidate(5.0, 4, 3), 2.0, true));
        assert!(!replaces(&candidate(6.0, 4, 3), &candidate(5.0, 4, 3), 2.0, true));
    }

    #[test]
    fn portrait_wins_ties_only_when_preferred() {
        let best = candidate(5.0, 4, 3);
        let tied_portrait = candidate(4.0, 3, 4);
        assert!(replaces(&tied_portrait, &best, 2.0, true));
        assert!(!replaces(&tied_portrait, &best, 2.0, false));
        // A landscape candidate never displaces a tied portrait best.
        assert!(!replaces(&best, &tied_portrait, 2.0, true));
    }
}
