//! Shared types for the docsnap normalization pipeline.

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryStrategy;
use crate::downsample::DownsampleFilter;

/// Re-export the `image` buffer types so downstream crates can reference
/// intermediate planes without depending on `image` directly.
pub use image::{GrayImage, RgbImage};

/// A 2D point in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Scale both coordinates independently.
    #[must_use]
    pub fn scale(self, sx: f64, sy: f64) -> Self {
        Self::new(self.x * sx, self.y * sy)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` when the image is at least as tall as it is wide.
    #[must_use]
    pub const fn is_portrait(self) -> bool {
        self.height >= self.width
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Number of interleaved 8-bit channels in a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha.
    Rgba,
}

impl Channels {
    /// Bytes per pixel.
    #[must_use]
    pub const fn count(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// An owned, row-major, 8-bit RGB or RGBA raster.
///
/// The buffer is moved from stage to stage; no two stages ever hold the
/// same buffer. The length of the backing storage always equals
/// `width * height * channels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a zero-filled buffer.
    #[must_use]
    pub fn new(width: u32, height: u32, channels: Channels) -> Self {
        let len = width as usize * height as usize * channels.count();
        Self {
            width,
            height,
            channels,
            data: vec![0; len],
        }
    }

    /// Wrap existing interleaved pixel data.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ZeroDimensions`] if either dimension is
    /// zero, and [`PipelineError::InvalidBuffer`] if `data` does not hold
    /// exactly `width * height * channels` bytes.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: Channels,
        data: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::ZeroDimensions);
        }
        let expected = width as usize * height as usize * channels.count();
        if data.len() != expected {
            return Err(PipelineError::InvalidBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Create an RGB buffer where every pixel has the same colour.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_fn_rgb(width, height, |_, _| rgb)
    }

    /// Create an RGB buffer by evaluating `f` at every pixel.
    pub fn from_fn_rgb(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            channels: Channels::Rgb,
            data,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Channel layout.
    #[must_use]
    pub const fn channels(&self) -> Channels {
        self.channels
    }

    /// Width and height as a [`Dimensions`] pair.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// The raw interleaved bytes.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw interleaved bytes.
    #[must_use]
    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the buffer and return the raw interleaved bytes.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Byte offset of the pixel at `(x, y)`.
    #[must_use]
    pub const fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels.count()
    }

    /// All channels of the pixel at `(x, y)`.
    ///
    /// Coordinates must be in bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let i = self.offset(x, y);
        &self.data[i..i + self.channels.count()]
    }

    /// The colour channels of the pixel at `(x, y)`, ignoring alpha.
    #[must_use]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Convert a decoded image, keeping an alpha channel only when the
    /// source has one.
    #[must_use]
    pub fn from_dynamic(image: &image::DynamicImage) -> Self {
        if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            let (width, height) = rgba.dimensions();
            Self {
                width,
                height,
                channels: Channels::Rgba,
                data: rgba.into_raw(),
            }
        } else {
            let rgb = image.to_rgb8();
            let (width, height) = rgb.dimensions();
            Self {
                width,
                height,
                channels: Channels::Rgb,
                data: rgb.into_raw(),
            }
        }
    }

    /// Copy the colour channels into an `image::RgbImage`, dropping alpha.
    #[must_use]
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let rgb: Vec<u8> = match self.channels {
            Channels::Rgb => self.data.clone(),
            Channels::Rgba => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };
        image::RgbImage::from_raw(self.width, self.height, rgb)
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
    }
}

/// An axis-aligned integer rectangle that lies entirely inside the image
/// it was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Rectangle {
    /// The rectangle covering the whole image.
    #[must_use]
    pub const fn full(dimensions: Dimensions) -> Self {
        Self {
            x: 0,
            y: 0,
            width: dimensions.width,
            height: dimensions.height,
        }
    }

    /// Create a rectangle, returning `None` if it is empty or extends
    /// past `bounds`.
    #[must_use]
    pub const fn within(x: u32, y: u32, width: u32, height: u32, bounds: Dimensions) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        if x as u64 + width as u64 > bounds.width as u64
            || y as u64 + height as u64 > bounds.height as u64
        {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Build a rectangle from floating-point edges (`right` and `bottom`
    /// exclusive), clamped to `bounds`.
    ///
    /// Returns `None` when nothing of the rectangle is left after clamping.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_edges_clamped(
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        bounds: Dimensions,
    ) -> Option<Self> {
        let max_x = f64::from(bounds.width);
        let max_y = f64::from(bounds.height);
        let x0 = left.floor().clamp(0.0, max_x) as u32;
        let y0 = top.floor().clamp(0.0, max_y) as u32;
        let x1 = right.ceil().clamp(0.0, max_x) as u32;
        let y1 = bottom.ceil().clamp(0.0, max_y) as u32;
        Self::within(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0), bounds)
    }

    /// Left edge (inclusive).
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Top edge (inclusive).
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Width in pixels, always > 0.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels, always > 0.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Width and height.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Area in pixels.
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// `true` when the rectangle is the whole of `bounds`.
    #[must_use]
    pub const fn covers(&self, bounds: Dimensions) -> bool {
        self.x == 0 && self.y == 0 && self.width == bounds.width && self.height == bounds.height
    }

    /// Grow the rectangle by `margin` pixels on every side, clamped to
    /// `bounds`.
    #[must_use]
    pub fn inflate(self, margin: u32, bounds: Dimensions) -> Self {
        let x0 = self.x.saturating_sub(margin);
        let y0 = self.y.saturating_sub(margin);
        let x1 = self.right().saturating_add(margin).min(bounds.width);
        let y1 = self.bottom().saturating_add(margin).min(bounds.height);
        Self::within(x0, y0, x1 - x0, y1 - y0, bounds).unwrap_or(self)
    }

    /// Shrink the rectangle by `dx` pixels on the left and right and `dy`
    /// on the top and bottom.
    ///
    /// Returns `None` if nothing would remain.
    #[must_use]
    pub const fn deflate(self, dx: u32, dy: u32) -> Option<Self> {
        if self.width <= 2 * dx || self.height <= 2 * dy {
            return None;
        }
        Some(Self {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width - 2 * dx,
            height: self.height - 2 * dy,
        })
    }
}

/// Four document corners in canonical order: top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    corners: [Point; 4],
}

impl Quadrilateral {
    /// Put four corners into canonical order.
    ///
    /// Corners are sorted by `y`; the two smallest form the top pair and
    /// the two largest the bottom pair. Each pair is then split by `x`.
    /// Ties are broken by `x` so the result is deterministic.
    #[must_use]
    pub fn from_unordered(mut corners: [Point; 4]) -> Self {
        corners.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
        let (tl, tr) = if corners[0].x <= corners[1].x {
            (corners[0], corners[1])
        } else {
            (corners[1], corners[0])
        };
        let (bl, br) = if corners[2].x <= corners[3].x {
            (corners[2], corners[3])
        } else {
            (corners[3], corners[2])
        };
        Self {
            corners: [tl, tr, br, bl],
        }
    }

    /// Corners as `[top_left, top_right, bottom_right, bottom_left]`.
    #[must_use]
    pub const fn corners(&self) -> [Point; 4] {
        self.corners
    }

    /// Top-left corner.
    #[must_use]
    pub const fn top_left(&self) -> Point {
        self.corners[0]
    }

    /// Top-right corner.
    #[must_use]
    pub const fn top_right(&self) -> Point {
        self.corners[1]
    }

    /// Bottom-right corner.
    #[must_use]
    pub const fn bottom_right(&self) -> Point {
        self.corners[2]
    }

    /// Bottom-left corner.
    #[must_use]
    pub const fn bottom_left(&self) -> Point {
        self.corners[3]
    }

    /// Enclosed area via the shoelace formula.
    #[must_use]
    pub fn area(&self) -> f64 {
        crate::geometry::polygon_area(&self.corners)
    }

    /// Scale every corner, e.g. to map working-resolution coordinates
    /// back to the source image.
    #[must_use]
    pub fn scale(&self, sx: f64, sy: f64) -> Self {
        Self::from_unordered(self.corners.map(|p| p.scale(sx, sy)))
    }

    /// Axis-aligned bounds of the corners, clamped to `bounds`.
    #[must_use]
    pub fn bounding_rect(&self, bounds: Dimensions) -> Option<Rectangle> {
        let xs = self.corners.map(|p| p.x);
        let ys = self.corners.map(|p| p.y);
        let fold_min = |v: [f64; 4]| v.into_iter().fold(f64::INFINITY, f64::min);
        let fold_max = |v: [f64; 4]| v.into_iter().fold(f64::NEG_INFINITY, f64::max);
        Rectangle::from_edges_clamped(fold_min(xs), fold_min(ys), fold_max(xs), fold_max(ys), bounds)
    }
}

/// Where the document is in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Boundary {
    /// A perspective-distorted page; rectified with a homography.
    Quad(Quadrilateral),
    /// An axis-aligned page; cropped directly.
    Rect(Rectangle),
    /// Nothing was found; downstream treats the frame as the page.
    WholeFrame,
}

impl Boundary {
    /// Short label used in logs and diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Quad(_) => "quad",
            Self::Rect(_) => "rect",
            Self::WholeFrame => "whole-frame",
        }
    }
}

/// Clockwise rotation by a multiple of 90°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation.
    #[default]
    R0,
    /// 90° clockwise.
    R90,
    /// 180°.
    R180,
    /// 270° clockwise (90° counter-clockwise).
    R270,
}

impl Rotation {
    /// All rotations, in the order the orientation selector visits them.
    pub const ALL: [Self; 4] = [Self::R0, Self::R90, Self::R180, Self::R270];

    /// Rotation angle in degrees.
    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }

    /// The rotation that undoes this one.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::R0 => Self::R0,
            Self::R90 => Self::R270,
            Self::R180 => Self::R180,
            Self::R270 => Self::R90,
        }
    }

    /// `true` for 90° and 270°, which swap width and height.
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::R90 | Self::R270)
    }
}

/// Colour painted where the perspective warp samples outside the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillColor {
    /// Paper white.
    #[default]
    White,
    /// Black.
    Black,
}

impl FillColor {
    /// RGBA value of the fill.
    #[must_use]
    pub const fn rgba(self) -> [u8; 4] {
        match self {
            Self::White => [255, 255, 255, 255],
            Self::Black => [0, 0, 0, 255],
        }
    }
}

/// How the quad strategy binarizes the luma plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// Foreground is everything brighter than a fixed luma value.
    Fixed(u8),
    /// Foreground is everything whose luma differs from the estimated
    /// background luma by more than `offset`.
    BackgroundRelative {
        /// Minimum luma difference from the background.
        offset: u8,
    },
}

impl Default for ThresholdMode {
    fn default() -> Self {
        Self::BackgroundRelative { offset: 40 }
    }
}

/// Configuration for the normalization pipeline.
///
/// All parameters have defaults tuned for high-speed-scanner photos
/// (a page on a dark desk, 8–12 MP). Deserialization fills missing
/// fields from [`Default`], so partial JSON configs are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest side, in pixels, of the copy used for detection and
    /// orientation scoring.
    pub working_resolution: u32,

    /// Resampling filter for the working copy.
    pub downsample_filter: DownsampleFilter,

    /// Which boundary detection strategy to run.
    pub boundary_strategy: BoundaryStrategy,

    /// Binarization rule for the quad strategy.
    pub threshold: ThresholdMode,

    /// Minimum document area as a fraction of the frame area.
    pub min_region_fraction: f64,

    /// Douglas–Peucker tolerance as a fraction of the region perimeter.
    pub quad_tolerance_fraction: f64,

    /// Bounding-box inflation as a fraction of the shorter frame side.
    pub bbox_margin: f64,

    /// RGB distance from the background colour above which a pixel is
    /// foreground (bounding-box strategy and overcrop).
    pub background_distance: f64,

    /// Whether to trim residual background after rectification.
    pub overcrop: bool,

    /// Inward trim per side, as a fraction of the rectified size.
    pub overcrop_margin: f64,

    /// Colour painted where the warp samples outside the source.
    pub fill: FillColor,

    /// Whether to run the orientation selector.
    pub orientation: bool,

    /// Scores closer than this are a tie (0–255 gradient units).
    pub orientation_epsilon: f64,

    /// On a tie, prefer the rotation whose result is portrait.
    pub prefer_portrait: bool,

    /// Gaussian sigma applied before gradient scoring.
    pub orientation_blur_sigma: f32,

    /// Whether to run flat-field illumination correction.
    pub illumination: bool,

    /// Background-estimate window side as a fraction of the longer side.
    pub illumination_kernel_fraction: f64,

    /// Whether to apply the fixed tone curve.
    pub tone_curve: bool,

    /// JPEG quality as a fraction in `(0, 1]`.
    pub jpeg_quality: f32,
}

impl PipelineConfig {
    /// Default working resolution (longest side in pixels).
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 1600;
    /// Default downsample filter.
    pub const DEFAULT_DOWNSAMPLE_FILTER: DownsampleFilter = DownsampleFilter::Triangle;
    /// Default minimum region fraction (~10 000 px² of a 1600×1200 frame).
    pub const DEFAULT_MIN_REGION_FRACTION: f64 = 0.004;
    /// Default polygon simplification tolerance (2% of perimeter).
    pub const DEFAULT_QUAD_TOLERANCE_FRACTION: f64 = 0.02;
    /// Default bounding-box margin (1.5% of the shorter side).
    pub const DEFAULT_BBOX_MARGIN: f64 = 0.015;
    /// Default foreground colour distance.
    pub const DEFAULT_BACKGROUND_DISTANCE: f64 = 60.0;
    /// Default overcrop margin (2% per side).
    pub const DEFAULT_OVERCROP_MARGIN: f64 = 0.02;
    /// Default orientation tie epsilon.
    pub const DEFAULT_ORIENTATION_EPSILON: f64 = 2.0;
    /// Default pre-scoring blur (roughly a 3×3 kernel).
    pub const DEFAULT_ORIENTATION_BLUR_SIGMA: f32 = 0.8;
    /// Default illumination window (100 px at 1600 px).
    pub const DEFAULT_ILLUMINATION_KERNEL_FRACTION: f64 = 0.0625;
    /// Default JPEG quality.
    pub const DEFAULT_JPEG_QUALITY: f32 = 0.92;

    /// Check the invariants the stages rely on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        fn check(ok: bool, msg: &str) -> Result<(), PipelineError> {
            if ok {
                Ok(())
            } else {
                Err(PipelineError::InvalidConfig(msg.to_owned()))
            }
        }

        check(self.working_resolution >= 16, "working_resolution must be at least 16")?;
        check(
            (0.0..1.0).contains(&self.min_region_fraction),
            "min_region_fraction must be in [0, 1)",
        )?;
        check(
            self.quad_tolerance_fraction > 0.0 && self.quad_tolerance_fraction < 0.5,
            "quad_tolerance_fraction must be in (0, 0.5)",
        )?;
        check(
            (0.0..0.5).contains(&self.bbox_margin),
            "bbox_margin must be in [0, 0.5)",
        )?;
        check(
            self.background_distance > 0.0,
            "background_distance must be positive",
        )?;
        check(
            (0.0..0.5).contains(&self.overcrop_margin),
            "overcrop_margin must be in [0, 0.5)",
        )?;
        check(
            self.orientation_epsilon >= 0.0,
            "orientation_epsilon must not be negative",
        )?;
        check(
            self.orientation_blur_sigma >= 0.0,
            "orientation_blur_sigma must not be negative",
        )?;
        check(
            self.illumination_kernel_fraction > 0.0 && self.illumination_kernel_fraction <= 1.0,
            "illumination_kernel_fraction must be in (0, 1]",
        )?;
        check(
            self.jpeg_quality > 0.0 && self.jpeg_quality <= 1.0,
            "jpeg_quality must be in (0, 1]",
        )?;
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_resolution: Self::DEFAULT_WORKING_RESOLUTION,
            downsample_filter: Self::DEFAULT_DOWNSAMPLE_FILTER,
            boundary_strategy: BoundaryStrategy::default(),
            threshold: ThresholdMode::default(),
            min_region_fraction: Self::DEFAULT_MIN_REGION_FRACTION,
            quad_tolerance_fraction: Self::DEFAULT_QUAD_TOLERANCE_FRACTION,
            bbox_margin: Self::DEFAULT_BBOX_MARGIN,
            background_distance: Self::DEFAULT_BACKGROUND_DISTANCE,
            overcrop: true,
            overcrop_margin: Self::DEFAULT_OVERCROP_MARGIN,
            fill: FillColor::default(),
            orientation: true,
            orientation_epsilon: Self::DEFAULT_ORIENTATION_EPSILON,
            prefer_portrait: true,
            orientation_blur_sigma: Self::DEFAULT_ORIENTATION_BLUR_SIGMA,
            illumination: true,
            illumination_kernel_fraction: Self::DEFAULT_ILLUMINATION_KERNEL_FRACTION,
            tone_curve: true,
            jpeg_quality: Self::DEFAULT_JPEG_QUALITY,
        }
    }
}

/// What each soft stage ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageOutcomes {
    /// A perspective warp was applied.
    pub warped: bool,
    /// A quad was found but degenerate, so its bounds were cropped instead.
    pub degenerate_fallback: bool,
    /// The overcrop pass trimmed the rectified image.
    pub overcropped: bool,
    /// Flat-field correction ran.
    pub illumination: bool,
    /// The tone curve ran.
    pub tone_curve: bool,
}

/// Result of running the full pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Encoded JPEG of the normalized document.
    pub jpeg: Vec<u8>,
    /// Dimensions of the encoded image.
    pub dimensions: Dimensions,
    /// Dimensions of the decoded source image.
    pub source_dimensions: Dimensions,
    /// The boundary that was used, in source coordinates.
    pub boundary: Boundary,
    /// The rotation that was applied after rectification.
    pub rotation: Rotation,
    /// Which soft stages applied.
    pub outcomes: StageOutcomes,
}

/// Errors that can occur during pipeline processing.
///
/// `BoundaryNotFound` and `DegenerateQuad` are absorbed inside the
/// pipeline with a fallback; they only escape from the individual stage
/// functions. Uses custom `Serialize`/`Deserialize` because
/// `image::ImageError` does not implement serde traits.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The decoded image has no pixels.
    #[error("image has zero width or height")]
    ZeroDimensions,

    /// A raw pixel buffer had the wrong length.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    InvalidBuffer {
        /// `width * height * channels`.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// No region cleared the minimum area threshold.
    #[error("no document boundary found")]
    BoundaryNotFound,

    /// The detected corners do not span a usable quadrilateral.
    #[error("document corners are degenerate")]
    DegenerateQuad,

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// `true` for errors that end a run (decode, encode, configuration).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::BoundaryNotFound | Self::DegenerateQuad)
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    EmptyInput,
    ImageDecode(String),
    ZeroDimensions,
    InvalidBuffer { expected: usize, actual: usize },
    BoundaryNotFound,
    DegenerateQuad,
    ImageEncode(String),
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::ZeroDimensions => PipelineErrorProxy::ZeroDimensions,
            Self::InvalidBuffer { expected, actual } => PipelineErrorProxy::InvalidBuffer {
                expected: *expected,
                actual: *actual,
            },
            Self::BoundaryNotFound => PipelineErrorProxy::BoundaryNotFound,
            Self::DegenerateQuad => PipelineErrorProxy::DegenerateQuad,
            Self::ImageEncode(s) => PipelineErrorProxy::ImageEncode(s.clone()),
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            // The typed image::ImageError cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::ImageDecode(image::ImageError::IoError(std::io::Error::other(msg)))
            }
            PipelineErrorProxy::ZeroDimensions => Self::ZeroDimensions,
            PipelineErrorProxy::InvalidBuffer { expected, actual } => {
                Self::InvalidBuffer { expected, actual }
            }
            PipelineErrorProxy::BoundaryNotFound => Self::BoundaryNotFound,
            PipelineErrorProxy::DegenerateQuad => Self::DegenerateQuad,
            PipelineErrorProxy::ImageEncode(s) => Self::ImageEncode(s),
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions::new(w, h)
    }

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    // --- PixelBuffer tests ---

    #[test]
    fn from_raw_rejects_wrong_length() {
        let result = PixelBuffer::from_raw(2, 2, Channels::Rgb, vec![0; 11]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidBuffer {
                expected: 12,
                actual: 11
            })
        ));
    }

    #[test]
    fn from_raw_rejects_zero_dimensions() {
        let result = PixelBuffer::from_raw(0, 2, Channels::Rgba, vec![]);
        assert!(matches!(result, Err(PipelineError::ZeroDimensions)));
    }

    #[test]
    fn pixel_access_is_row_major() {
        let buf = PixelBuffer::from_fn_rgb(3, 2, |x, y| [x as u8, y as u8, 7]);
        assert_eq!(buf.rgb(2, 1), [2, 1, 7]);
        assert_eq!(buf.pixel(1, 0), &[1, 0, 7]);
        assert_eq!(buf.as_raw().len(), 18);
    }

    #[test]
    fn rgba_to_rgb_image_drops_alpha() {
        let buf = PixelBuffer::from_raw(1, 1, Channels::Rgba, vec![10, 20, 30, 40]).unwrap();
        let rgb = buf.to_rgb_image();
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    // --- Rectangle tests ---

    #[test]
    fn rectangle_within_rejects_out_of_bounds() {
        assert!(Rectangle::within(5, 5, 6, 5, dims(10, 10)).is_none());
        assert!(Rectangle::within(0, 0, 0, 5, dims(10, 10)).is_none());
        assert!(Rectangle::within(5, 5, 5, 5, dims(10, 10)).is_some());
    }

    #[test]
    fn rectangle_accessors_report_validated_edges() {
        let r = Rectangle::within(3, 4, 5, 6, dims(10, 10)).unwrap();
        assert_eq!((r.x(), r.y(), r.width(), r.height()), (3, 4, 5, 6));
        assert_eq!((r.right(), r.bottom()), (8, 10));
        let full = Rectangle::full(dims(7, 9));
        assert!(full.covers(dims(7, 9)));
        assert_eq!(full.dimensions(), dims(7, 9));
    }

    #[test]
    fn rectangle_from_edges_clamps() {
        let r = Rectangle::from_edges_clamped(-4.2, 2.5, 120.0, 8.1, dims(100, 50)).unwrap();
        assert_eq!(r, Rectangle::within(0, 2, 100, 7, dims(100, 50)).unwrap());
    }

    #[test]
    fn rectangle_inflate_and_deflate() {
        let bounds = dims(100, 100);
        let r = Rectangle::within(10, 10, 20, 20, bounds).unwrap();
        let grown = r.inflate(15, bounds);
        assert_eq!(grown, Rectangle::within(0, 0, 45, 45, bounds).unwrap());
        let shrunk = r.deflate(2, 3).unwrap();
        assert_eq!(shrunk, Rectangle::within(12, 13, 16, 14, bounds).unwrap());
        assert!(r.deflate(10, 0).is_none());
    }

    // --- Quadrilateral tests ---

    #[test]
    fn quad_ordering_is_canonical() {
        let q = Quadrilateral::from_unordered([
            Point::new(90.0, 110.0),
            Point::new(10.0, 5.0),
            Point::new(5.0, 100.0),
            Point::new(95.0, 0.0),
        ]);
        assert_eq!(q.top_left(), Point::new(10.0, 5.0));
        assert_eq!(q.top_right(), Point::new(95.0, 0.0));
        assert_eq!(q.bottom_right(), Point::new(90.0, 110.0));
        assert_eq!(q.bottom_left(), Point::new(5.0, 100.0));
    }

    #[test]
    fn quad_ordering_is_idempotent() {
        let q = Quadrilateral::from_unordered([
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert_eq!(Quadrilateral::from_unordered(q.corners()), q);
        assert!((q.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn quad_bounding_rect_is_clamped() {
        let q = Quadrilateral::from_unordered([
            Point::new(-5.0, 2.0),
            Point::new(50.0, 0.0),
            Point::new(55.0, 40.0),
            Point::new(0.0, 45.0),
        ]);
        let r = q.bounding_rect(dims(52, 44)).unwrap();
        assert_eq!((r.x(), r.y(), r.right(), r.bottom()), (0, 0, 52, 44));
    }

    // --- Rotation tests ---

    #[test]
    fn rotation_inverse_round_trips() {
        for r in Rotation::ALL {
            assert_eq!(r.inverse().inverse(), r);
            assert_eq!((r.degrees() + r.inverse().degrees()) % 360, 0);
        }
    }

    // --- PipelineConfig tests ---

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_quality() {
        let config = PipelineConfig {
            jpeg_quality: 1.5,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("jpeg_quality")
        ));
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            threshold: ThresholdMode::Fixed(90),
            fill: FillColor::Black,
            orientation_epsilon: 3.5,
            overcrop: false,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"fill":"Black"}"#).unwrap();
        assert_eq!(config.fill, FillColor::Black);
        assert_eq!(
            config.working_resolution,
            PipelineConfig::DEFAULT_WORKING_RESOLUTION
        );
    }

    // --- PipelineError tests ---

    #[test]
    fn soft_errors_are_not_fatal() {
        assert!(!PipelineError::BoundaryNotFound.is_fatal());
        assert!(!PipelineError::DegenerateQuad.is_fatal());
        assert!(PipelineError::EmptyInput.is_fatal());
    }

    #[test]
    fn pipeline_error_serde_round_trip_invalid_config() {
        let err = PipelineError::InvalidConfig("bad value".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(deserialized, PipelineError::InvalidConfig(ref s) if s == "bad value"));
    }

    #[test]
    fn pipeline_error_serde_keeps_decode_message() {
        let err = PipelineError::ImageDecode(image::ImageError::IoError(std::io::Error::other(
            "truncated",
        )));
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(deserialized.to_string().contains("truncated"));
    }
}
