//! Still-image decoding and JPEG encoding.
//!
//! These are the only two stages that can end a run: everything between
//! them degrades to a pass-through instead of failing.

use std::io::Cursor;

use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageReader};
use tracing::{debug, instrument};

use crate::types::{PipelineError, PixelBuffer};

/// Decode raw image bytes into an owned RGB(A) buffer.
///
/// Supports whatever the `image` crate was built with (JPEG, PNG, BMP,
/// WebP). An EXIF orientation tag is applied so the buffer is upright as
/// a browser would display it. An alpha channel is kept only when the
/// source has one.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty,
/// [`PipelineError::ImageDecode`] if the format is unrecognized or the
/// data is corrupt, and [`PipelineError::ZeroDimensions`] if the image has
/// no pixels.
#[instrument(skip_all, fields(len = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::from)?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);

    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::ZeroDimensions);
    }

    let buffer = PixelBuffer::from_dynamic(&image);
    debug!(
        width = buffer.width(),
        height = buffer.height(),
        channels = buffer.channels().count(),
        "decoded",
    );
    Ok(buffer)
}

/// Map a quality fraction in `(0, 1]` to the encoder's 1–100 scale.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn jpeg_quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encode a buffer as baseline JPEG.
///
/// Alpha is dropped; the image is never resized.
///
/// # Errors
///
/// Returns [`PipelineError::ZeroDimensions`] for an empty buffer and
/// [`PipelineError::ImageEncode`] if the encoder rejects the data.
#[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
pub fn encode(buffer: &PixelBuffer, quality: f32) -> Result<Vec<u8>, PipelineError> {
    if buffer.width() == 0 || buffer.height() == 0 {
        return Err(PipelineError::ZeroDimensions);
    }

    let rgb = buffer.to_rgb_image();
    let mut out = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, jpeg_quality_percent(quality));
    encoder
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PipelineError::ImageEncode(e.to_string()))?;

    debug!(bytes = out.len(), "encoded");
    Ok(out)
}
