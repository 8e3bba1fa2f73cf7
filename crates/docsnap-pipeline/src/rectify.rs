//! Rectification: perspective warp, crop and overcrop.
//!
//! A [`Boundary::Quad`] is mapped onto an upright `W × H` rectangle through
//! the inverse homography with bilinear sampling. A [`Boundary::Rect`] is a
//! plain pixel copy. [`Boundary::WholeFrame`] passes the buffer through.
//! Nothing here fails: a degenerate quad falls back to a crop of its
//! bounds.

use tracing::{debug, instrument, warn};

use crate::boundary::{Background, rgb_distance};
use crate::geometry::is_strictly_convex;
use crate::homography::Homography;
use crate::mask::Mask;
use crate::types::{
    Boundary, Dimensions, FillColor, PipelineConfig, PipelineError, PixelBuffer, Point,
    Quadrilateral, Rectangle,
};

/// Upper bound on the warped size relative to the source's longest side.
const MAX_WARP_GROWTH: f64 = 4.0;

/// Outcome of the rectifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rectification {
    /// The rectified image.
    pub buffer: PixelBuffer,
    /// A perspective warp was applied.
    pub warped: bool,
    /// The quad was degenerate and its bounds were cropped instead.
    pub degenerate_fallback: bool,
    /// Residual background was trimmed.
    pub overcropped: bool,
}

/// Rectify `buffer` according to `boundary`.
///
/// `boundary` must be in `buffer`'s coordinates.
#[instrument(skip_all, fields(boundary = boundary.kind()))]
pub fn rectify(
    buffer: PixelBuffer,
    boundary: &Boundary,
    background: Background,
    config: &PipelineConfig,
) -> Rectification {
    let dims = buffer.dimensions();
    let (rectified, filled, warped, degenerate_fallback) = match *boundary {
        Boundary::WholeFrame => {
            return Rectification {
                buffer,
                warped: false,
                degenerate_fallback: false,
                overcropped: false,
            };
        }
        Boundary::Rect(rect) => (crop(&buffer, rect), None, false, false),
        Boundary::Quad(quad) => match warp_quad(&buffer, &quad, config.fill) {
            Ok((warped, filled)) => (warped, Some(filled), true, false),
            Err(e) => {
                warn!(error = %e, "falling back to a crop of the quad bounds");
                match quad.bounding_rect(dims) {
                    Some(rect) => (crop(&buffer, rect), None, false, true),
                    None => (buffer, None, false, true),
                }
            }
        },
    };

    let (buffer, overcropped) = if config.overcrop {
        overcrop(rectified, filled.as_ref(), background, config)
    } else {
        (rectified, false)
    };

    debug!(
        width = buffer.width(),
        height = buffer.height(),
        warped,
        overcropped,
        "rectified",
    );
    Rectification {
        buffer,
        warped,
        degenerate_fallback,
        overcropped,
    }
}

/// Target size for a quad: the longer of each pair of opposite edges.
#[must_use]
pub fn target_size(quad: &Quadrilateral) -> (f64, f64) {
    let [tl, tr, br, bl] = quad.corners();
    let width = tl.distance(tr).max(bl.distance(br));
    let height = tl.distance(bl).max(tr.distance(br));
    (width.round(), height.round())
}

/// Warp the quad region onto an upright rectangle.
///
/// Returns the warped image and a mask of the pixels painted with the fill
/// colour because they map outside the source.
///
/// # Errors
///
/// Returns [`PipelineError::DegenerateQuad`] for collinear or non-convex
/// corners, a target smaller than one pixel, or a singular homography.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn warp_quad(
    buffer: &PixelBuffer,
    quad: &Quadrilateral,
    fill: FillColor,
) -> Result<(PixelBuffer, Mask), PipelineError> {
    let corners = quad.corners();
    if quad.area() < 1.0 || !is_strictly_convex(&corners) {
        return Err(PipelineError::DegenerateQuad);
    }
    let (width, height) = target_size(quad);
    let limit = MAX_WARP_GROWTH * f64::from(buffer.width().max(buffer.height()));
    if width < 1.0 || height < 1.0 || width > limit || height > limit {
        return Err(PipelineError::DegenerateQuad);
    }

    let target = [
        Point::new(0.0, 0.0),
        Point::new(width, 0.0),
        Point::new(width, height),
        Point::new(0.0, height),
    ];
    let inverse = Homography::from_correspondences(&corners, &target)?.inverse()?;
    Ok(warp_perspective(
        buffer,
        &inverse,
        Dimensions::new(width as u32, height as u32),
        fill,
    ))
}

/// Resample `src` through `inverse` (destination → source) into a buffer
/// of size `size`, bilinearly.
///
/// Each destination pixel is sampled at its centre. Samples farther than
/// half a pixel outside the source are painted with `fill`.
#[must_use = "returns the warped image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn warp_perspective(
    src: &PixelBuffer,
    inverse: &Homography,
    size: Dimensions,
    fill: FillColor,
) -> (PixelBuffer, Mask) {
    let channels = src.channels();
    let n = channels.count();
    let fill_px = fill.rgba();
    let mut out = PixelBuffer::new(size.width, size.height, channels);
    let mut filled = Mask::new(size.width, size.height);
    let (sw, sh) = (f64::from(src.width()), f64::from(src.height()));
    let max_x = src.width() - 1;
    let max_y = src.height() - 1;
    let data = src.as_raw();

    for y in 0..size.height {
        for x in 0..size.width {
            let centre = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            let offset = out.offset(x, y);
            let sample = inverse
                .project(centre)
                .map(|p| (p.x - 0.5, p.y - 0.5))
                .filter(|&(u, v)| u >= -0.5 && v >= -0.5 && u <= sw - 0.5 && v <= sh - 0.5);

            let Some((u, v)) = sample else {
                out.as_raw_mut()[offset..offset + n].copy_from_slice(&fill_px[..n]);
                filled.set(x, y, true);
                continue;
            };

            let u = u.clamp(0.0, f64::from(max_x));
            let v = v.clamp(0.0, f64::from(max_y));
            let (x0, y0) = (u.floor() as u32, v.floor() as u32);
            let (x1, y1) = ((x0 + 1).min(max_x), (y0 + 1).min(max_y));
            let (fx, fy) = (u - f64::from(x0), v - f64::from(y0));

            let p00 = src.offset(x0, y0);
            let p10 = src.offset(x1, y0);
            let p01 = src.offset(x0, y1);
            let p11 = src.offset(x1, y1);
            for c in 0..n {
                let top = f64::from(data[p00 + c]).mul_add(1.0 - fx, f64::from(data[p10 + c]) * fx);
                let bottom =
                    f64::from(data[p01 + c]).mul_add(1.0 - fx, f64::from(data[p11 + c]) * fx);
                let value = top.mul_add(1.0 - fy, bottom * fy);
                out.as_raw_mut()[offset + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    (out, filled)
}

/// Copy the pixels inside `rect`.
///
/// A rectangle that does not fit the buffer yields an unchanged copy.
#[must_use = "returns the cropped image"]
pub fn crop(buffer: &PixelBuffer, rect: Rectangle) -> PixelBuffer {
    if rect.right() > buffer.width() || rect.bottom() > buffer.height() {
        return buffer.clone();
    }
    let n = buffer.channels().count();
    let row_len = rect.width() as usize * n;
    let mut data = Vec::with_capacity(row_len * rect.height() as usize);
    for y in rect.y()..rect.bottom() {
        let start = buffer.offset(rect.x(), y);
        data.extend_from_slice(&buffer.as_raw()[start..start + row_len]);
    }
    PixelBuffer::from_raw(rect.width(), rect.height(), buffer.channels(), data)
        .unwrap_or_else(|_| buffer.clone())
}

/// Tight bounds of the pixels that are neither background-coloured nor
/// warp fill, ignoring rows and columns with only a few stray pixels.
#[must_use]
pub fn content_bounds(
    buffer: &PixelBuffer,
    filled: Option<&Mask>,
    background: Background,
    distance: f64,
) -> Option<Rectangle> {
    let (w, h) = (buffer.width(), buffer.height());
    let mut row_counts = vec![0u32; h as usize];
    let mut col_counts = vec![0u32; w as usize];
    for y in 0..h {
        for x in 0..w {
            if filled.is_some_and(|m| m.get(x, y)) {
                continue;
            }
            if rgb_distance(background.rgb, buffer.rgb(x, y)) > distance {
                row_counts[y as usize] += 1;
                col_counts[x as usize] += 1;
            }
        }
    }

    let span = |counts: &[u32], min: u32| {
        let first = counts.iter().position(|&c| c >= min)?;
        let last = counts.iter().rposition(|&c| c >= min)?;
        Some((first, last))
    };
    let (y0, y1) = span(&row_counts, (w / 200).max(1))?;
    let (x0, x1) = span(&col_counts, (h / 200).max(1))?;
    let to_u32 = |v: usize| u32::try_from(v).ok();
    Rectangle::within(
        to_u32(x0)?,
        to_u32(y0)?,
        to_u32(x1 - x0 + 1)?,
        to_u32(y1 - y0 + 1)?,
        buffer.dimensions(),
    )
}

/// Trim residual background: crop to the content bounds, then move each
/// side inward by `overcrop_margin` of the content size.
///
/// Returns the input unchanged when no content is found or the trim would
/// leave nothing.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn overcrop(
    buffer: PixelBuffer,
    filled: Option<&Mask>,
    background: Background,
    config: &PipelineConfig,
) -> (PixelBuffer, bool) {
    let Some(bounds) = content_bounds(&buffer, filled, background, config.background_distance)
    else {
        debug!("overcrop found no content; skipped");
        return (buffer, false);
    };
    let dx = (f64::from(bounds.width()) * config.overcrop_margin).round() as u32;
    let dy = (f64::from(bounds.height()) * config.overcrop_margin).round() as u32;
    let Some(trimmed) = bounds.deflate(dx, dy) else {
        debug!(?bounds, "overcrop would leave an empty image; skipped");
        return (buffer, false);
    };
    if trimmed.covers(buffer.dimensions()) {
        return (buffer, false);
    }
    (crop(&buffer, trimmed), true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Channels;

    const DARK: Background = Background {
        rgb: [20, 20, 20],
        luma: 20,
    };

    fn no_overcrop() -> PipelineConfig {
        PipelineConfig {
            overcrop: false,
            ..PipelineConfig::default()
        }
    }

    fn gradient(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::from_fn_rgb(w, h, |x, y| [(x % 256) as u8, (y % 256) as u8, 77])
    }

    fn quad(points: [(f64, f64); 4]) -> Quadrilateral {
        Quadrilateral::from_unordered(points.map(|(x, y)| Point::new(x, y)))
    }

    #[test]
    fn whole_frame_passes_through() {
        let buffer = gradient(30, 20);
        let out = rectify(buffer.clone(), &Boundary::WholeFrame, DARK, &PipelineConfig::default());
        assert_eq!(out.buffer, buffer);
        assert!(!out.warped && !out.overcropped);
    }

    #[test]
    fn rect_crop_copies_pixels() {
        let buffer = gradient(50, 40);
        let rect = Rectangle::within(10, 5, 20, 15, buffer.dimensions()).unwrap();
        let out = rectify(buffer.clone(), &Boundary::Rect(rect), DARK, &no_overcrop());
        assert_eq!(out.buffer.dimensions(), Dimensions::new(20, 15));
        assert_eq!(out.buffer.rgb(0, 0), buffer.rgb(10, 5));
        assert_eq!(out.buffer.rgb(19, 14), buffer.rgb(29, 19));
    }

    #[test]
    fn axis_aligned_quad_warp_matches_crop() {
        let buffer = gradient(80, 60);
        let q = quad([(10.0, 10.0), (50.0, 10.0), (50.0, 40.0), (10.0, 40.0)]);
        let (warped, filled) = warp_quad(&buffer, &q, FillColor::White).unwrap();
        assert_eq!(warped.dimensions(), Dimensions::new(40, 30));
        assert_eq!(filled.count(), 0);
        for (x, y) in [(0, 0), (17, 9), (39, 29)] {
            assert_eq!(warped.rgb(x, y), buffer.rgb(x + 10, y + 10), "at ({x},{y})");
        }
    }

    #[test]
    fn full_frame_warp_samples_last_row_and_column() {
        let buffer = gradient(20, 10);
        let q = quad([(0.0, 0.0), (20.0, 0.0), (20.0, 10.0), (0.0, 10.0)]);
        let (warped, filled) = warp_quad(&buffer, &q, FillColor::Black).unwrap();
        assert_eq!(filled.count(), 0);
        assert_eq!(warped.rgb(19, 9), buffer.rgb(19, 9));
        assert_eq!(warped.rgb(19, 0), buffer.rgb(19, 0));
    }

    #[test]
    fn target_size_uses_longer_edges() {
        let q = quad([(0.0, 0.0), (100.0, 10.0), (90.0, 210.0), (0.0, 200.0)]);
        let (w, h) = target_size(&q);
        // Top edge (100.5) beats bottom (90.6); right edge (200.2) beats left (200).
        assert!((w - 100.0).abs() < f64::EPSILON, "got {w}");
        assert!((h - 200.0).abs() < f64::EPSILON, "got {h}");
    }

    #[test]
    fn outside_samples_use_fill_colour() {
        let buffer = PixelBuffer::filled(40, 40, [100, 100, 100]);
        // Quad extends past the left edge of the source.
        let q = quad([(-20.0, 0.0), (20.0, 0.0), (20.0, 40.0), (-20.0, 40.0)]);
        let (warped, filled) = warp_quad(&buffer, &q, FillColor::Black).unwrap();
        assert_eq!(warped.rgb(2, 20), [0, 0, 0]);
        assert!(filled.get(2, 20));
        assert_eq!(warped.rgb(35, 20), [100, 100, 100]);
    }

    #[test]
    fn warp_keeps_alpha_channel() {
        let buffer = PixelBuffer::from_raw(4, 4, Channels::Rgba, vec![9; 64]).unwrap();
        let q = quad([(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]);
        let (warped, _) = warp_quad(&buffer, &q, FillColor::White).unwrap();
        assert_eq!(warped.channels(), Channels::Rgba);
        assert_eq!(warped.pixel(1, 1), &[9, 9, 9, 9]);
    }

    #[test]
    fn degenerate_quad_falls_back_to_bounds_crop() {
        let buffer = gradient(60, 60);
        let line = quad([(5.0, 5.0), (20.0, 20.0), (35.0, 35.0), (50.0, 50.0)]);
        assert!(matches!(
            warp_quad(&buffer, &line, FillColor::White),
            Err(PipelineError::DegenerateQuad)
        ));

        let out = rectify(buffer, &Boundary::Quad(line), DARK, &no_overcrop());
        assert!(out.degenerate_fallback);
        assert!(!out.warped);
        assert_eq!(out.buffer.dimensions(), Dimensions::new(45, 45));
    }

    #[test]
    fn overcrop_trims_background_border() {
        // 100×80 light page inside a 10 px dark border.
        let buffer = PixelBuffer::from_fn_rgb(120, 100, |x, y| {
            if (10..110).contains(&x) && (10..90).contains(&y) {
                [240, 240, 240]
            } else {
                [20, 20, 20]
            }
        });
        let rect = Rectangle::full(buffer.dimensions());
        let out = rectify(buffer, &Boundary::Rect(rect), DARK, &PipelineConfig::default());
        assert!(out.overcropped);
        // Content 100×80, trimmed 2 px per side horizontally, 2 px vertically.
        assert_eq!(out.buffer.dimensions(), Dimensions::new(96, 76));
        assert_eq!(out.buffer.rgb(0, 0), [240, 240, 240]);
    }

    #[test]
    fn overcrop_skips_when_no_content() {
        let buffer = PixelBuffer::filled(30, 30, [20, 20, 20]);
        let rect = Rectangle::full(buffer.dimensions());
        let out = rectify(buffer, &Boundary::Rect(rect), DARK, &PipelineConfig::default());
        assert!(!out.overcropped);
        assert_eq!(out.buffer.dimensions(), Dimensions::new(30, 30));
    }

    #[test]
    fn crop_with_rect_from_larger_image_is_a_copy() {
        let buffer = gradient(10, 10);
        let rect = Rectangle::within(5, 5, 10, 10, Dimensions::new(20, 20)).unwrap();
        assert_eq!(crop(&buffer, rect), buffer);
    }
}
