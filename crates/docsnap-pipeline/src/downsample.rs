//! Downsampling to the working resolution.
//!
//! Boundary detection and orientation scoring do not need every pixel of
//! an 8–12 MP capture. They run on a copy whose longest axis is at most
//! `working_resolution`; geometry found there is mapped back to source
//! coordinates with the returned [`ScaleFactor`].
//!
//! If the image is already at or below the target resolution, it is
//! returned unchanged.

use std::fmt;

use image::{ImageBuffer, Pixel};
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Point};

/// Resampling filter used when downsampling.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality,
/// with a `Disabled` variant to skip downsampling entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownsampleFilter {
    /// Skip downsampling regardless of image size.
    Disabled,
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl DownsampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    ///
    /// Returns `None` for [`DownsampleFilter::Disabled`] since there is
    /// no corresponding resampling filter.
    const fn to_image_filter(self) -> Option<image::imageops::FilterType> {
        match self {
            Self::Disabled => None,
            Self::Nearest => Some(image::imageops::FilterType::Nearest),
            Self::Triangle => Some(image::imageops::FilterType::Triangle),
            Self::CatmullRom => Some(image::imageops::FilterType::CatmullRom),
            Self::Gaussian => Some(image::imageops::FilterType::Gaussian),
            Self::Lanczos3 => Some(image::imageops::FilterType::Lanczos3),
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Ratio between source and working-copy coordinates, per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    /// `source_width / working_width`.
    pub x: f64,
    /// `source_height / working_height`.
    pub y: f64,
}

impl ScaleFactor {
    /// No scaling.
    pub const IDENTITY: Self = Self { x: 1.0, y: 1.0 };

    /// The factor that maps `working` coordinates onto `source`.
    #[must_use]
    pub fn between(source: Dimensions, working: Dimensions) -> Self {
        Self {
            x: f64::from(source.width) / f64::from(working.width.max(1)),
            y: f64::from(source.height) / f64::from(working.height.max(1)),
        }
    }

    /// Map a working-copy point to source coordinates.
    #[must_use]
    pub fn to_source(self, p: Point) -> Point {
        p.scale(self.x, self.y)
    }
}

/// Size of the downsampled copy, or `None` if the image already fits.
///
/// The longest axis becomes exactly `max_dimension`; the other axis keeps
/// the aspect ratio (rounded, at least 1 px).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn target_dimensions(source: Dimensions, max_dimension: u32) -> Option<Dimensions> {
    let long_axis = source.width.max(source.height);
    if long_axis <= max_dimension || max_dimension == 0 {
        return None;
    }
    let ratio = f64::from(max_dimension) / f64::from(long_axis);
    let scaled = |v: u32| ((f64::from(v) * ratio).round() as u32).clamp(1, max_dimension);
    Some(Dimensions::new(scaled(source.width), scaled(source.height)))
}

/// Downsample an image so the longest axis is at most `max_dimension`
/// pixels, using the specified resampling filter.
///
/// Returns the (possibly unchanged) image and the factor mapping its
/// coordinates back onto the input.
#[must_use = "returns the downsampled image"]
pub fn downsample<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    max_dimension: u32,
    filter: DownsampleFilter,
) -> (ImageBuffer<P, Vec<P::Subpixel>>, ScaleFactor)
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let source = Dimensions::new(image.width(), image.height());
    let (Some(image_filter), Some(target)) = (
        filter.to_image_filter(),
        target_dimensions(source, max_dimension),
    ) else {
        return (image.clone(), ScaleFactor::IDENTITY);
    };

    let resized = image::imageops::resize(image, target.width, target.height, image_filter);
    (resized, ScaleFactor::between(source, target))
}
