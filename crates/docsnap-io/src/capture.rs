//! Data-URL front end for [`normalize_capture`].

use docsnap_pipeline::{PipelineConfig, normalize_capture};
use tracing::{instrument, warn};

use crate::data_url::DataUrl;

/// A capture after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCapture {
    /// A JPEG data URL, or the input exactly as given when `enhanced` is
    /// `false`.
    pub data_url: String,
    /// `true` when the pipeline produced the image.
    pub enhanced: bool,
}

impl NormalizedCapture {
    fn unchanged(input: &str) -> Self {
        Self {
            data_url: input.to_owned(),
            enhanced: false,
        }
    }
}

/// Normalize a capture given as a data URL or bare base64 payload.
///
/// Never fails. If the payload cannot be decoded, or the pipeline fails,
/// the input string comes back unmodified.
#[must_use]
#[instrument(skip_all, fields(input_len = input.len()))]
pub fn normalize_data_url(input: &str, config: &PipelineConfig) -> NormalizedCapture {
    let parsed = match DataUrl::parse(input) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "capture is not a usable data URL");
            return NormalizedCapture::unchanged(input);
        }
    };
    let output = normalize_capture(&parsed.bytes, config);
    if !output.enhanced {
        return NormalizedCapture::unchanged(input);
    }
    NormalizedCapture {
        data_url: DataUrl::jpeg(output.bytes).to_string(),
        enhanced: true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use docsnap_pipeline::{PixelBuffer, codec};

    use super::*;

    #[test]
    fn valid_capture_is_enhanced() {
        let jpeg = codec::encode(&PixelBuffer::filled(48, 32, [150, 150, 150]), 0.9).unwrap();
        let input = DataUrl::jpeg(jpeg).to_string();
        let out = normalize_data_url(&input, &PipelineConfig::default());
        assert!(out.enhanced);
        let parsed = DataUrl::parse(&out.data_url).unwrap();
        let decoded = codec::decode(&parsed.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (48, 32));
    }

    #[test]
    fn bad_base64_is_returned_unchanged() {
        let input = "data:image/jpeg;base64,!!not-base64!!";
        let out = normalize_data_url(input, &PipelineConfig::default());
        assert!(!out.enhanced);
        assert_eq!(out.data_url, input);
    }

    #[test]
    fn undecodable_image_is_returned_unchanged() {
        // Valid base64 of bytes that are not an image.
        let input = "bm90IGFuIGltYWdl";
        let out = normalize_data_url(input, &PipelineConfig::default());
        assert!(!out.enhanced);
        assert_eq!(out.data_url, input);
    }
}
