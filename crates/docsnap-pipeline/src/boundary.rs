//! Document boundary detection.
//!
//! This module defines the [`BoundaryDetector`] trait for pluggable
//! detection strategies and the [`BoundaryStrategy`] enum for selecting
//! which one to use at runtime.
//!
//! # Strategy pattern
//!
//! The quad strategy finds a perspective-distorted page and yields four
//! corners for the homography warp. The bounding-box strategy only finds
//! an axis-aligned crop but survives pages whose outline is broken by
//! shadows or clutter. [`BoundaryStrategy::Auto`] tries them in that order.
//!
//! Both run on the downsampled working copy; [`to_source`] maps the
//! result back to full-resolution coordinates.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::components::label_regions;
use crate::downsample::ScaleFactor;
use crate::geometry::{convex_hull, perimeter};
use crate::grayscale::rgb_to_luma;
use crate::mask::Mask;
use crate::simplify::simplify_closed;
use crate::types::{
    Boundary, Dimensions, PipelineConfig, PipelineError, Quadrilateral, Rectangle, RgbImage,
    ThresholdMode,
};

/// Tolerance multipliers tried, in order, when a hull does not simplify
/// to exactly four vertices at the configured tolerance.
const QUAD_TOLERANCE_LADDER: [f64; 3] = [1.0, 1.5, 2.0];

/// Estimated colour of whatever the document is lying on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    /// Per-channel median of the corner patches.
    pub rgb: [u8; 3],
    /// Luma of [`rgb`](Self::rgb).
    pub luma: u8,
}

impl Background {
    /// Sample square patches at the four frame corners and take the
    /// per-channel median.
    ///
    /// Patches are 1/20 of the shorter side (at least 2 px, at most the
    /// whole image).
    #[must_use]
    pub fn estimate(image: &RgbImage) -> Self {
        let (w, h) = image.dimensions();
        let patch = (w.min(h) / 20).max(2).min(w.min(h));
        let mut channels: [Vec<u8>; 3] = Default::default();
        let origins = [
            (0, 0),
            (w - patch, 0),
            (0, h - patch),
            (w - patch, h - patch),
        ];
        for (ox, oy) in origins {
            for y in oy..oy + patch {
                for x in ox..ox + patch {
                    let px = image.get_pixel(x, y).0;
                    for (c, values) in channels.iter_mut().enumerate() {
                        values.push(px[c]);
                    }
                }
            }
        }
        let rgb = channels.map(|mut values| {
            values.sort_unstable();
            values.get(values.len() / 2).copied().unwrap_or(0)
        });
        Self {
            rgb,
            luma: crate::grayscale::luma(rgb),
        }
    }

    /// Euclidean RGB distance from the background colour.
    #[must_use]
    pub fn distance(&self, rgb: [u8; 3]) -> f64 {
        rgb_distance(self.rgb, rgb)
    }
}

/// Euclidean distance between two RGB colours.
#[must_use]
pub fn rgb_distance(a: [u8; 3], b: [u8; 3]) -> f64 {
    a.iter()
        .zip(&b)
        .map(|(&p, &q)| {
            let d = f64::from(p) - f64::from(q);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Everything a detector looks at.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    /// Working-resolution colour image.
    pub image: &'a RgbImage,
    /// Luma plane of [`image`](Self::image).
    pub luma: &'a GrayImage,
    /// Background estimate from the frame corners.
    pub background: Background,
}

impl DetectionInput<'_> {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }

    /// Minimum accepted document area in pixels.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn min_area(&self, config: &PipelineConfig) -> u64 {
        (self.dimensions().pixel_count() as f64 * config.min_region_fraction).ceil() as u64
    }
}

/// Selects which boundary detection strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryStrategy {
    /// Quad first, bounding box when no quad is found.
    #[default]
    Auto,
    /// Only the quad strategy.
    Quad,
    /// Only the bounding-box strategy.
    BoundingBox,
}

/// Trait for boundary detection strategies.
///
/// Returns [`PipelineError::BoundaryNotFound`] when nothing clears the
/// minimum area; callers fall back to [`Boundary::WholeFrame`].
pub trait BoundaryDetector {
    /// Locate the document in the working-resolution image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BoundaryNotFound`] if no candidate
    /// region is large enough.
    fn detect(
        &self,
        input: &DetectionInput<'_>,
        config: &PipelineConfig,
    ) -> Result<Boundary, PipelineError>;
}

impl BoundaryDetector for BoundaryStrategy {
    fn detect(
        &self,
        input: &DetectionInput<'_>,
        config: &PipelineConfig,
    ) -> Result<Boundary, PipelineError> {
        match *self {
            Self::Auto => QuadDetector
                .detect(input, config)
                .or_else(|_| BoundingBoxDetector.detect(input, config)),
            Self::Quad => QuadDetector.detect(input, config),
            Self::BoundingBox => BoundingBoxDetector.detect(input, config),
        }
    }
}

/// Binarize, clean up, label regions and fit a four-vertex polygon to each.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadDetector;

impl BoundaryDetector for QuadDetector {
    #[instrument(skip_all, name = "quad_detect")]
    fn detect(
        &self,
        input: &DetectionInput<'_>,
        config: &PipelineConfig,
    ) -> Result<Boundary, PipelineError> {
        let mask = threshold(input.luma, config.threshold, input.background.luma)
            .close()
            .open();
        let min_area = input.min_area(config);
        let regions = label_regions(&mask, min_area);
        debug!(regions = regions.len(), min_area, "labelled candidate regions");

        let min_area_f = f64::from(u32::try_from(min_area).unwrap_or(u32::MAX));
        let best = regions
            .iter()
            .filter_map(|region| fit_quad(&region.outline, config.quad_tolerance_fraction))
            .map(|quad| (quad.area(), quad))
            .filter(|&(area, _)| area > min_area_f)
            .max_by(|a, b| a.0.total_cmp(&b.0));

        match best {
            Some((area, quad)) => {
                debug!(area, corners = ?quad.corners(), "quad found");
                Ok(Boundary::Quad(quad))
            }
            None => Err(PipelineError::BoundaryNotFound),
        }
    }
}

/// Classify by colour distance from the background and take the tight
/// bounding box of what remains.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBoxDetector;

impl BoundaryDetector for BoundingBoxDetector {
    #[instrument(skip_all, name = "bbox_detect")]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn detect(
        &self,
        input: &DetectionInput<'_>,
        config: &PipelineConfig,
    ) -> Result<Boundary, PipelineError> {
        let dims = input.dimensions();
        let mask = foreground_by_colour(input.image, input.background, config.background_distance)
            .open();
        let foreground = mask.count();
        if foreground <= input.min_area(config) {
            debug!(foreground, "too little foreground for a bounding box");
            return Err(PipelineError::BoundaryNotFound);
        }
        let bounds = mask.bounding_box().ok_or(PipelineError::BoundaryNotFound)?;
        let margin = (config.bbox_margin * f64::from(dims.width.min(dims.height))).round() as u32;
        let rect = bounds.inflate(margin, dims);
        debug!(?rect, margin, "bounding box found");
        Ok(Boundary::Rect(rect))
    }
}

/// Binarize a luma plane.
#[must_use = "returns the foreground mask"]
pub fn threshold(luma: &GrayImage, mode: ThresholdMode, background_luma: u8) -> Mask {
    Mask::from_fn(luma.width(), luma.height(), |x, y| {
        let v = luma.get_pixel(x, y).0[0];
        match mode {
            ThresholdMode::Fixed(t) => v > t,
            ThresholdMode::BackgroundRelative { offset } => v.abs_diff(background_luma) > offset,
        }
    })
}

/// Pixels whose colour is farther than `distance` from the background.
#[must_use = "returns the foreground mask"]
pub fn foreground_by_colour(image: &RgbImage, background: Background, distance: f64) -> Mask {
    Mask::from_fn(image.width(), image.height(), |x, y| {
        background.distance(image.get_pixel(x, y).0) > distance
    })
}

/// Fit a quadrilateral to a region outline, or `None` if its hull does
/// not reduce to four vertices.
fn fit_quad(outline: &[crate::types::Point], tolerance_fraction: f64) -> Option<Quadrilateral> {
    let hull = convex_hull(outline);
    if hull.len() < 4 {
        return None;
    }
    let base = tolerance_fraction * perimeter(&hull);
    for factor in QUAD_TOLERANCE_LADDER {
        let simplified = simplify_closed(&hull, base * factor);
        match simplified.len() {
            4 => {
                let corners = [simplified[0], simplified[1], simplified[2], simplified[3]];
                return Some(Quadrilateral::from_unordered(corners));
            }
            0..=3 => return None,
            _ => {}
        }
    }
    None
}

/// Run the configured strategy on a working-resolution image.
///
/// Returns the boundary in working coordinates together with the
/// background estimate.
///
/// # Errors
///
/// Returns [`PipelineError::BoundaryNotFound`] when the strategy finds
/// nothing.
pub fn detect(
    image: &RgbImage,
    config: &PipelineConfig,
) -> (Result<Boundary, PipelineError>, Background) {
    let luma = rgb_to_luma(image);
    let background = Background::estimate(image);
    debug!(?background, "estimated background");
    let input = DetectionInput {
        image,
        luma: &luma,
        background,
    };
    (config.boundary_strategy.detect(&input, config), background)
}

/// Map a working-resolution boundary onto the source image.
#[must_use]
pub fn to_source(boundary: Boundary, scale: ScaleFactor, source: Dimensions) -> Boundary {
    match boundary {
        Boundary::Quad(quad) => Boundary::Quad(quad.scale(scale.x, scale.y)),
        Boundary::Rect(rect) => Rectangle::from_edges_clamped(
            f64::from(rect.x()) * scale.x,
            f64::from(rect.y()) * scale.y,
            f64::from(rect.right()) * scale.x,
            f64::from(rect.bottom()) * scale.y,
            source,
        )
        .map_or(Boundary::WholeFrame, Boundary::Rect),
        Boundary::WholeFrame => Boundary::WholeFrame,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mask::FOREGROUND;
    use crate::types::Point;

    const DARK: [u8; 3] = [30, 32, 35];
    const PAPER: [u8; 3] = [235, 232, 225];

    fn input_for(image: &RgbImage) -> (GrayImage, Background) {
        (rgb_to_luma(image), Background::estimate(image))
    }

    fn page_on_desk(w: u32, h: u32, page: impl Fn(f64, f64) -> bool) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let (cx, cy) = (f64::from(x) + 0.5, f64::from(y) + 0.5);
            image::Rgb(if page(cx, cy) { PAPER } else { DARK })
        })
    }

    /// Point-in-convex-quad test for clockwise (image coordinates) corners.
    fn inside(corners: &[Point; 4], x: f64, y: f64) -> bool {
        (0..4).all(|i| {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x) >= 0.0
        })
    }

    #[test]
    fn default_is_auto() {
        assert_eq!(BoundaryStrategy::default(), BoundaryStrategy::Auto);
    }

    #[test]
    fn background_comes_from_corners() {
        let image = page_on_desk(200, 160, |x, y| (40.0..160.0).contains(&x) && (30.0..130.0).contains(&y));
        let bg = Background::estimate(&image);
        assert_eq!(bg.rgb, DARK);
        assert_eq!(bg.luma, crate::grayscale::luma(DARK));
    }

    #[test]
    fn uniform_frame_has_no_boundary() {
        let image = RgbImage::from_pixel(120, 90, image::Rgb([128, 128, 128]));
        let (result, _) = detect(&image, &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::BoundaryNotFound)));
    }

    #[test]
    fn quad_strategy_finds_skewed_page_corners() {
        let truth = [
            Point::new(60.0, 40.0),
            Point::new(250.0, 60.0),
            Point::new(235.0, 270.0),
            Point::new(45.0, 250.0),
        ];
        let image = page_on_desk(300, 300, |x, y| inside(&truth, x, y));
        let (luma, background) = input_for(&image);
        let input = DetectionInput {
            image: &image,
            luma: &luma,
            background,
        };
        let boundary = QuadDetector
            .detect(&input, &PipelineConfig::default())
            .unwrap();
        let quad = match boundary {
            Boundary::Quad(quad) => Some(quad),
            _ => None,
        }
        .unwrap();
        for (found, expected) in quad.corners().iter().zip(truth) {
            assert!(
                found.distance(expected) < 3.0,
                "corner {found:?} too far from {expected:?}",
            );
        }
    }

    #[test]
    fn bounding_box_strategy_finds_white_rectangle() {
        let image = RgbImage::from_fn(200, 150, |x, y| {
            if (40..140).contains(&x) && (30..110).contains(&y) {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let (luma, background) = input_for(&image);
        let input = DetectionInput {
            image: &image,
            luma: &luma,
            background,
        };
        let boundary = BoundingBoxDetector
            .detect(&input, &PipelineConfig::default())
            .unwrap();
        // Margin is 1.5% of 150 px, rounded to 2 px.
        let expected = Rectangle::within(38, 28, 104, 84, Dimensions::new(200, 150)).unwrap();
        assert_eq!(boundary, Boundary::Rect(expected));
    }

    #[test]
    fn tiny_blob_is_not_a_document() {
        let image = page_on_desk(400, 300, |x, y| (10.0..16.0).contains(&x) && (10.0..16.0).contains(&y));
        let (result, _) = detect(&image, &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::BoundaryNotFound)));
    }

    #[test]
    fn fixed_threshold_marks_bright_pixels() {
        let luma = GrayImage::from_fn(4, 1, |x, _| image::Luma([[10, 100, 101, 250][x as usize]]));
        let mask = threshold(&luma, ThresholdMode::Fixed(100), 0);
        assert_eq!(mask.as_image().as_raw(), &[0, 0, FOREGROUND, FOREGROUND]);
    }

    #[test]
    fn background_relative_threshold_is_symmetric() {
        let luma = GrayImage::from_fn(3, 1, |x, _| image::Luma([[20, 128, 240][x as usize]]));
        let mask = threshold(&luma, ThresholdMode::BackgroundRelative { offset: 40 }, 128);
        assert_eq!(mask.as_image().as_raw(), &[FOREGROUND, 0, FOREGROUND]);
    }

    #[test]
    fn rect_is_scaled_to_source() {
        let working = Dimensions::new(100, 50);
        let source = Dimensions::new(400, 200);
        let rect = Rectangle::within(10, 5, 50, 20, working).unwrap();
        let scaled = to_source(Boundary::Rect(rect), ScaleFactor::between(source, working), source);
        assert_eq!(
            scaled,
            Boundary::Rect(Rectangle::within(40, 20, 200, 80, source).unwrap())
        );
    }
}
