//! docsnap-pipeline: document-capture normalization (sans-IO).
//!
//! Turns a photograph of a page into a flat, upright, evenly lit scan:
//! decode -> boundary detection -> perspective rectification ->
//! orientation selection -> flat-field illumination -> tone curve ->
//! JPEG encode.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! byte slices and returns structured data. Data URLs, hardware
//! messages and background execution live in `docsnap-io`.

pub mod blur;
pub mod boundary;
pub mod codec;
pub mod components;
pub mod diagnostics;
pub mod downsample;
pub mod geometry;
pub mod grayscale;
pub mod homography;
pub mod illumination;
pub mod mask;
pub mod orientation;
pub mod pipeline;
pub mod rectify;
pub mod simplify;
pub mod tone;
pub mod types;

use tracing::{info, instrument, warn};

pub use boundary::{Background, BoundaryDetector, BoundaryStrategy};
pub use downsample::DownsampleFilter;
pub use pipeline::Pipeline;
pub use tone::ToneCurve;
pub use types::{
    Boundary, Dimensions, FillColor, PipelineConfig, PipelineError, PixelBuffer, Point,
    ProcessResult, Quadrilateral, Rectangle, Rotation, StageOutcomes, ThresholdMode,
};

/// Run the full normalization pipeline.
///
/// Takes encoded image bytes (JPEG, PNG, BMP, WebP) and a configuration
/// and produces the normalized document as JPEG together with what each
/// stage decided.
///
/// # Pipeline steps
///
/// 1. Decode (EXIF orientation applied)
/// 2. Downsample to the working resolution and locate the page
/// 3. Warp or crop the page out of the frame, then trim residual background
/// 4. Pick the upright rotation
/// 5. Flat-field uneven lighting
/// 6. Apply the document tone curve
/// 7. Encode as JPEG
///
/// Steps 2 through 6 never fail; they fall back to passing the image
/// through.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` is out of range,
/// [`PipelineError::EmptyInput`], [`PipelineError::ImageDecode`] or
/// [`PipelineError::ZeroDimensions`] if the input cannot be decoded, and
/// [`PipelineError::ImageEncode`] if encoding fails.
#[instrument(skip_all, fields(input_bytes = image_bytes.len()))]
pub fn process(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<ProcessResult, PipelineError> {
    let result = Pipeline::new(image_bytes.to_vec(), config.clone())
        .decode()?
        .detect_boundary()
        .rectify()
        .orient()
        .flatten()
        .tone_map()
        .encode()?;
    info!(
        width = result.dimensions.width,
        height = result.dimensions.height,
        boundary = result.boundary.kind(),
        rotation = result.rotation.degrees(),
        "document normalized"
    );
    Ok(result)
}

/// What [`normalize_capture`] hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutput {
    /// The normalized JPEG, or the untouched input when `enhanced` is
    /// `false`.
    pub bytes: Vec<u8>,
    /// `true` when the pipeline produced the bytes.
    pub enhanced: bool,
}

/// Normalize a captured photo, surfacing the original bytes on failure.
///
/// This never fails: if the pipeline cannot decode or encode the image
/// the caller gets its input back with `enhanced == false`.
#[must_use]
pub fn normalize_capture(image_bytes: &[u8], config: &PipelineConfig) -> CaptureOutput {
    match process(image_bytes, config) {
        Ok(result) => CaptureOutput {
            bytes: result.jpeg,
            enhanced: true,
        },
        Err(e) => {
            warn!(error = %e, "normalization failed, keeping the original capture");
            CaptureOutput {
                bytes: image_bytes.to_vec(),
                enhanced: false,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn process_rejects_empty_input() {
        let err = process(&[], &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    #[test]
    fn process_rejects_garbage() {
        let err = process(b"not an image", &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ImageDecode(_)));
    }

    #[test]
    fn normalize_capture_returns_original_on_failure() {
        let garbage = b"still not an image".to_vec();
        let out = normalize_capture(&garbage, &PipelineConfig::default());
        assert!(!out.enhanced);
        assert_eq!(out.bytes, garbage);
    }

    #[test]
    fn normalize_capture_returns_original_on_bad_config() {
        let jpeg = codec::encode(&PixelBuffer::filled(32, 24, [200, 200, 200]), 0.9).unwrap();
        let config = PipelineConfig {
            jpeg_quality: 0.0,
            ..PipelineConfig::default()
        };
        let out = normalize_capture(&jpeg, &config);
        assert!(!out.enhanced);
        assert_eq!(out.bytes, jpeg);
    }

    #[test]
    fn normalize_capture_enhances_valid_jpeg() {
        let jpeg = codec::encode(&PixelBuffer::filled(64, 48, [180, 170, 160]), 0.9).unwrap();
        let out = normalize_capture(&jpeg, &PipelineConfig::default());
        assert!(out.enhanced);
        let decoded = codec::decode(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), Dimensions::new(64, 48));
    }
}
