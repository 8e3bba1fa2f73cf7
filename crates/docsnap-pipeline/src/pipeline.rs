//! Typestate pipeline for step-by-step normalization.
//!
//! Each pipeline stage is represented by a distinct struct. Calling
//! the advance method on one stage consumes it and returns the next,
//! so stages cannot be skipped or reordered. Every stage exposes its
//! intermediate result through accessor methods.
//!
//! The one-call [`process`](crate::process) and
//! [`process_with_diagnostics`](crate::diagnostics::process_with_diagnostics)
//! are both thin drivers over this chain.

use tracing::{debug, warn};

use crate::boundary::{self, Background};
use crate::codec;
use crate::diagnostics::StageMetrics;
use crate::downsample::downsample;
use crate::illumination::{normalize_illumination, window_radius};
use crate::orientation::{CandidateScore, select_orientation};
use crate::rectify::{Rectification, rectify};
use crate::tone::ToneCurve;
use crate::types::{
    Boundary, Dimensions, PipelineConfig, PipelineError, PixelBuffer, ProcessResult, Rotation,
    StageOutcomes,
};

/// State that travels with the buffer from stage to stage.
#[derive(Debug, Clone)]
struct Trail {
    config: PipelineConfig,
    input_bytes: usize,
    source_dimensions: Dimensions,
    boundary: Boundary,
    rotation: Rotation,
    outcomes: StageOutcomes,
}

// ───────────────────────── Stage 0: Pending ─────────────────────────

/// Pipeline stage before any processing.
///
/// Created by [`Pipeline::new`]. Holds the encoded input and config.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
#[derive(Debug)]
pub struct Pending {
    config: PipelineConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The encoded input bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// The pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the config and decode the input.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for out-of-range settings,
    /// and [`PipelineError::EmptyInput`], [`PipelineError::ImageDecode`] or
    /// [`PipelineError::ZeroDimensions`] when decoding fails.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        self.config.validate()?;
        let original = codec::decode(&self.source)?;
        let source_dimensions = original.dimensions();
        Ok(Decoded {
            trail: Trail {
                config: self.config,
                input_bytes: self.source.len(),
                source_dimensions,
                boundary: Boundary::WholeFrame,
                rotation: Rotation::R0,
                outcomes: StageOutcomes::default(),
            },
            original,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ─────────────────────────

/// Pipeline stage after decoding.
#[must_use = "pipeline stages are consumed by advancing; call .detect_boundary() to continue"]
#[derive(Debug)]
pub struct Decoded {
    trail: Trail,
    original: PixelBuffer,
}

impl Decoded {
    /// The decoded full-resolution image.
    #[must_use]
    pub const fn original(&self) -> &PixelBuffer {
        &self.original
    }

    /// Metrics describing the decode.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let dims = self.original.dimensions();
        StageMetrics::Decode {
            input_bytes: self.trail.input_bytes,
            width: dims.width,
            height: dims.height,
            pixel_count: dims.pixel_count(),
            channels: self.original.channels().count(),
        }
    }

    /// Locate the document on a working-resolution copy and map the
    /// result back onto the full-resolution image.
    ///
    /// Never fails: when nothing is found the whole frame is used.
    pub fn detect_boundary(self) -> BoundaryDetected {
        let Self { mut trail, original } = self;
        let config = &trail.config;
        let (working, scale) = downsample(
            &original.to_rgb_image(),
            config.working_resolution,
            config.downsample_filter,
        );
        let working_dimensions = Dimensions::new(working.width(), working.height());
        debug!(
            working_width = working_dimensions.width,
            working_height = working_dimensions.height,
            "working copy ready"
        );

        let (detected, background) = boundary::detect(&working, config);
        let (boundary, found) = match detected {
            Ok(b) => (
                boundary::to_source(b, scale, trail.source_dimensions),
                true,
            ),
            Err(e) => {
                warn!(error = %e, "no document boundary, using the whole frame");
                (Boundary::WholeFrame, false)
            }
        };
        trail.boundary = boundary;
        BoundaryDetected {
            trail,
            original,
            working_dimensions,
            background,
            found,
        }
    }
}

// ─────────────────────── Stage 2: BoundaryDetected ───────────────────────

/// Pipeline stage after boundary detection.
#[must_use = "pipeline stages are consumed by advancing; call .rectify() to continue"]
#[derive(Debug)]
pub struct BoundaryDetected {
    trail: Trail,
    original: PixelBuffer,
    working_dimensions: Dimensions,
    background: Background,
    found: bool,
}

impl BoundaryDetected {
    /// The decoded full-resolution image.
    #[must_use]
    pub const fn original(&self) -> &PixelBuffer {
        &self.original
    }

    /// The boundary in full-resolution coordinates.
    #[must_use]
    pub const fn boundary(&self) -> &Boundary {
        &self.trail.boundary
    }

    /// The background estimate from the frame corners.
    #[must_use]
    pub const fn background(&self) -> Background {
        self.background
    }

    /// Size of the copy detection ran on.
    #[must_use]
    pub const fn working_dimensions(&self) -> Dimensions {
        self.working_dimensions
    }

    /// `false` when the detector found nothing and the whole frame is used.
    #[must_use]
    pub const fn found(&self) -> bool {
        self.found
    }

    /// Metrics describing the detection.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn metrics(&self) -> StageMetrics {
        let source_pixels = self.trail.source_dimensions.pixel_count().max(1) as f64;
        let coverage = match self.trail.boundary {
            Boundary::Quad(quad) => quad.area() / source_pixels,
            Boundary::Rect(rect) => rect.area() as f64 / source_pixels,
            Boundary::WholeFrame => 1.0,
        };
        StageMetrics::Boundary {
            strategy: self.trail.config.boundary_strategy,
            working_width: self.working_dimensions.width,
            working_height: self.working_dimensions.height,
            background_luma: self.background.luma,
            kind: self.trail.boundary.kind().to_owned(),
            found: self.found,
            coverage,
        }
    }

    /// Warp or crop the document out of the frame.
    pub fn rectify(self) -> Rectified {
        let Self {
            mut trail,
            original,
            background,
            ..
        } = self;
        let rectification = rectify(original, &trail.boundary, background, &trail.config);
        trail.outcomes.warped = rectification.warped;
        trail.outcomes.degenerate_fallback = rectification.degenerate_fallback;
        trail.outcomes.overcropped = rectification.overcropped;
        Rectified {
            trail,
            rectification,
        }
    }
}

// ───────────────────────── Stage 3: Rectified ─────────────────────────

/// Pipeline stage after rectification.
#[must_use = "pipeline stages are consumed by advancing; call .orient() to continue"]
#[derive(Debug)]
pub struct Rectified {
    trail: Trail,
    rectification: Rectification,
}

impl Rectified {
    /// The rectified image.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.rectification.buffer
    }

    /// The full rectifier outcome.
    #[must_use]
    pub const fn rectification(&self) -> &Rectification {
        &self.rectification
    }

    /// Metrics describing the rectification.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let r = &self.rectification;
        StageMetrics::Rectify {
            width: r.buffer.width(),
            height: r.buffer.height(),
            warped: r.warped,
            degenerate_fallback: r.degenerate_fallback,
            overcropped: r.overcropped,
        }
    }

    /// Pick the upright rotation, or pass through when disabled.
    pub fn orient(self) -> Oriented {
        let Self {
            mut trail,
            rectification,
        } = self;
        if !trail.config.orientation {
            return Oriented {
                trail,
                buffer: rectification.buffer,
                score: None,
                candidates: Vec::new(),
            };
        }
        let result = select_orientation(rectification.buffer, &trail.config);
        trail.rotation = result.rotation;
        Oriented {
            trail,
            buffer: result.buffer,
            score: Some(result.score),
            candidates: result.candidates,
        }
    }
}

// ───────────────────────── Stage 4: Oriented ─────────────────────────

/// Pipeline stage after orientation selection.
#[must_use = "pipeline stages are consumed by advancing; call .flatten() to continue"]
#[derive(Debug)]
pub struct Oriented {
    trail: Trail,
    buffer: PixelBuffer,
    score: Option<f64>,
    candidates: Vec<CandidateScore>,
}

impl Oriented {
    /// The rotated image.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// The applied clockwise rotation.
    #[must_use]
    pub const fn rotation(&self) -> Rotation {
        self.trail.rotation
    }

    /// Scores of all four candidates, empty when orientation is disabled.
    #[must_use]
    pub fn candidates(&self) -> &[CandidateScore] {
        &self.candidates
    }

    /// Metrics describing the selection, or `None` when it was skipped.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        self.score.map(|score| StageMetrics::Orientation {
            rotation_degrees: self.trail.rotation.degrees(),
            score,
            candidate_scores: self.candidates.iter().map(|c| c.score).collect(),
        })
    }

    /// Flat-field the image, or pass through when disabled.
    pub fn flatten(self) -> Flattened {
        let Self {
            mut trail, buffer, ..
        } = self;
        let buffer = if trail.config.illumination {
            trail.outcomes.illumination = true;
            normalize_illumination(buffer, trail.config.illumination_kernel_fraction)
        } else {
            buffer
        };
        Flattened { trail, buffer }
    }
}

// ───────────────────────── Stage 5: Flattened ─────────────────────────

/// Pipeline stage after illumination correction.
#[must_use = "pipeline stages are consumed by advancing; call .tone_map() to continue"]
#[derive(Debug)]
pub struct Flattened {
    trail: Trail,
    buffer: PixelBuffer,
}

impl Flattened {
    /// The flat-fielded image.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Metrics describing the correction, or `None` when it was skipped.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        self.trail
            .outcomes
            .illumination
            .then(|| StageMetrics::Illumination {
                kernel_radius: window_radius(
                    self.buffer.width(),
                    self.buffer.height(),
                    self.trail.config.illumination_kernel_fraction,
                ),
            })
    }

    /// Apply the document tone curve, or pass through when disabled.
    pub fn tone_map(self) -> ToneMapped {
        let Self { mut trail, buffer } = self;
        let buffer = if trail.config.tone_curve {
            trail.outcomes.tone_curve = true;
            ToneCurve::document().apply(buffer)
        } else {
            buffer
        };
        ToneMapped { trail, buffer }
    }
}

// ───────────────────────── Stage 6: ToneMapped ─────────────────────────

/// Final pipeline stage: the normalized document, ready to encode.
#[must_use = "pipeline stages are consumed by advancing; call .encode() to finish"]
#[derive(Debug)]
pub struct ToneMapped {
    trail: Trail,
    buffer: PixelBuffer,
}

impl ToneMapped {
    /// The normalized image.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Take the normalized image without encoding it.
    #[must_use]
    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    /// Metrics describing the tone mapping, or `None` when it was skipped.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn metrics(&self) -> Option<StageMetrics> {
        if !self.trail.outcomes.tone_curve {
            return None;
        }
        let n = self.buffer.channels().count();
        let total = self.buffer.dimensions().pixel_count().max(1);
        let white = self
            .buffer
            .as_raw()
            .chunks_exact(n)
            .filter(|px| px.iter().take(3).all(|&c| c == u8::MAX))
            .count();
        Some(StageMetrics::Tone {
            white_fraction: white as f64 / total as f64,
        })
    }

    /// Encode the image as JPEG and assemble the final result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ImageEncode`] if the encoder fails.
    pub fn encode(self) -> Result<ProcessResult, PipelineError> {
        let jpeg = codec::encode(&self.buffer, self.trail.config.jpeg_quality)?;
        Ok(ProcessResult {
            jpeg,
            dimensions: self.buffer.dimensions(),
            source_dimensions: self.trail.source_dimensions,
            boundary: self.trail.boundary,
            rotation: self.trail.rotation,
            outcomes: self.trail.outcomes,
        })
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental document normalization pipeline.
///
/// Created via [`Pipeline::new`], which stores the input and config
/// without doing any processing. The caller then chains stage methods:
///
/// ```rust
/// # use docsnap_pipeline::{Pipeline, PipelineConfig, PipelineError};
/// # fn run(jpeg: Vec<u8>) -> Result<(), PipelineError> {
/// let result = Pipeline::new(jpeg, PipelineConfig::default())
///     .decode()?
///     .detect_boundary()
///     .rectify()
///     .orient()
///     .flatten()
///     .tone_map()
///     .encode()?;
/// # Ok(())
/// # }
/// ```
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from encoded image bytes and config.
    ///
    /// No processing is performed. Call [`.decode()`](Pending::decode) to
    /// begin.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Pending {
        Pending {
            config,
            source: image_bytes,
        }
    }
}
