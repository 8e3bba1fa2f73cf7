//! Luma extraction.
//!
//! Every detection and scoring step works on a single 8-bit luma plane
//! computed with the Rec. 601 weights `0.299*R + 0.587*G + 0.114*B`.

use image::GrayImage;

use crate::types::{PixelBuffer, RgbImage};

/// Luma of one RGB triple, rounded to the nearest integer.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn luma(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(u32::from);
    ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
}

/// Luma plane of a pixel buffer (alpha ignored).
#[must_use = "returns the luma plane"]
pub fn to_luma(buffer: &PixelBuffer) -> GrayImage {
    GrayImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        image::Luma([luma(buffer.rgb(x, y))])
    })
}

/// Luma plane of an `RgbImage`.
#[must_use = "returns the luma plane"]
pub fn rgb_to_luma(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        image::Luma([luma(image.get_pixel(x, y).0)])
    })
}
