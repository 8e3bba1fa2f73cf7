//! Pipeline diagnostics: timing, sizes, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter tuning. [`process_with_diagnostics`] collects them
//! alongside the pipeline result.
//!
//! The crate is sans-IO, so timestamps come from an injected [`Clock`]:
//! the CLI uses `std::time::Instant`, the web worker uses `web-time`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::boundary::BoundaryStrategy;
use crate::pipeline::Pipeline;
use crate::types::{PipelineConfig, PipelineError, ProcessResult};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Stages that can be switched off in [`PipelineConfig`] have `Option`
/// fields that are `None` when the stage was not executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: downsampling and boundary detection.
    pub boundary: StageDiagnostics,
    /// Stage 3: warp or crop, then overcrop.
    pub rectify: StageDiagnostics,
    /// Stage 4: orientation selection (only when `config.orientation`).
    pub orientation: Option<StageDiagnostics>,
    /// Stage 5: flat-field correction (only when `config.illumination`).
    pub illumination: Option<StageDiagnostics>,
    /// Stage 6: tone curve (only when `config.tone_curve`).
    pub tone: Option<StageDiagnostics>,
    /// Stage 7: JPEG encoding.
    pub encode: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the encoded input.
        input_bytes: usize,
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
        /// 3 for RGB, 4 for RGBA.
        channels: usize,
    },
    /// Boundary detection metrics.
    Boundary {
        /// Configured strategy.
        strategy: BoundaryStrategy,
        /// Width of the working copy.
        working_width: u32,
        /// Height of the working copy.
        working_height: u32,
        /// Luma of the estimated background.
        background_luma: u8,
        /// `quad`, `rect` or `whole-frame`.
        kind: String,
        /// `false` when the whole frame was used as a fallback.
        found: bool,
        /// Boundary area as a fraction of the frame.
        coverage: f64,
    },
    /// Rectification metrics.
    Rectify {
        /// Rectified width.
        width: u32,
        /// Rectified height.
        height: u32,
        /// A perspective warp was applied.
        warped: bool,
        /// A degenerate quad was replaced by its bounds.
        degenerate_fallback: bool,
        /// Residual background was trimmed.
        overcropped: bool,
    },
    /// Orientation selection metrics.
    Orientation {
        /// Chosen clockwise rotation.
        rotation_degrees: u32,
        /// Score of the chosen rotation.
        score: f64,
        /// Scores for 0°, 90°, 180°, 270°.
        candidate_scores: Vec<f64>,
    },
    /// Flat-field metrics.
    Illumination {
        /// Radius of the box window used to estimate the lighting field.
        kernel_radius: u32,
    },
    /// Tone curve metrics.
    Tone {
        /// Fraction of pixels that ended up pure white.
        white_fraction: f64,
    },
    /// JPEG encoding metrics.
    Encode {
        /// Encoder quality, 1–100.
        quality: u8,
        /// Size of the encoded output.
        output_bytes: usize,
        /// Encoded width.
        width: u32,
        /// Encoded height.
        height: u32,
    },
}

/// Summary across all stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source width in pixels.
    pub source_width: u32,
    /// Source height in pixels.
    pub source_height: u32,
    /// Output width in pixels.
    pub output_width: u32,
    /// Output height in pixels.
    pub output_height: u32,
    /// `quad`, `rect` or `whole-frame`.
    pub boundary: String,
    /// Applied clockwise rotation.
    pub rotation_degrees: u32,
    /// Size of the encoded output.
    pub output_bytes: usize,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable table.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Source: {}x{}  ->  Output: {}x{} ({} bytes)",
            self.summary.source_width,
            self.summary.source_height,
            self.summary.output_width,
            self.summary.output_height,
            self.summary.output_bytes,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let stages: Vec<(&str, &StageDiagnostics)> = {
            let mut s = vec![
                ("Decode", &self.decode),
                ("Boundary", &self.boundary),
                ("Rectify", &self.rectify),
            ];
            if let Some(ref o) = self.orientation {
                s.push(("Orientation", o));
            }
            if let Some(ref i) = self.illumination {
                s.push(("Illumination", i));
            }
            if let Some(ref t) = self.tone {
                s.push(("Tone", t));
            }
            s.push(("Encode", &self.encode));
            s
        };

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Boundary: {}  |  Rotation: {}°",
            self.summary.boundary, self.summary.rotation_degrees,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            channels,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}x{channels}"),
        StageMetrics::Boundary {
            strategy,
            working_width,
            working_height,
            background_luma,
            kind,
            found,
            coverage,
        } => {
            let status = if *found { "" } else { " (fallback)" };
            format!(
                "{strategy:?} on {working_width}x{working_height}, bg={background_luma}, \
                 {kind}{status}, {:.1}% of frame",
                coverage * 100.0,
            )
        }
        StageMetrics::Rectify {
            width,
            height,
            warped,
            degenerate_fallback,
            overcropped,
        } => {
            let how = if *warped {
                "warped"
            } else if *degenerate_fallback {
                "degenerate, cropped"
            } else {
                "cropped"
            };
            let trim = if *overcropped { ", overcropped" } else { "" };
            format!("{width}x{height} {how}{trim}")
        }
        StageMetrics::Orientation {
            rotation_degrees,
            score,
            candidate_scores,
        } => {
            let all: Vec<String> = candidate_scores.iter().map(|s| format!("{s:.2}")).collect();
            format!("{rotation_degrees}° score={score:.2} [{}]", all.join(", "))
        }
        StageMetrics::Illumination { kernel_radius } => format!("radius={kernel_radius}"),
        StageMetrics::Tone { white_fraction } => {
            format!("{:.1}% white", white_fraction * 100.0)
        }
        StageMetrics::Encode {
            quality,
            output_bytes,
            width,
            height,
        } => format!("q={quality} {width}x{height} -> {output_bytes} bytes"),
    }
}

/// Run `f`, returning its output and how long it took.
fn timed<C: Clock, T>(clock: &C, f: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let out = f();
    (out, clock.elapsed(&start))
}

/// Run the full pipeline, timing every stage.
///
/// # Errors
///
/// Returns the same errors as [`process`](crate::process).
pub fn process_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    clock: &C,
) -> Result<(ProcessResult, PipelineDiagnostics), PipelineError> {
    let run_start = clock.now();
    let pending = Pipeline::new(image_bytes.to_vec(), config.clone());

    let (decoded, t) = timed(clock, || pending.decode());
    let decoded = decoded?;
    let decode = StageDiagnostics {
        duration: t,
        metrics: decoded.metrics(),
    };

    let (detected, t) = timed(clock, || decoded.detect_boundary());
    let boundary = StageDiagnostics {
        duration: t,
        metrics: detected.metrics(),
    };

    let (rectified, t) = timed(clock, || detected.rectify());
    let rectify = StageDiagnostics {
        duration: t,
        metrics: rectified.metrics(),
    };

    let (oriented, t) = timed(clock, || rectified.orient());
    let orientation = oriented.metrics().map(|metrics| StageDiagnostics {
        duration: t,
        metrics,
    });

    let (flattened, t) = timed(clock, || oriented.flatten());
    let illumination = flattened.metrics().map(|metrics| StageDiagnostics {
        duration: t,
        metrics,
    });

    let (toned, t) = timed(clock, || flattened.tone_map());
    let tone = toned.metrics().map(|metrics| StageDiagnostics {
        duration: t,
        metrics,
    });

    let (result, t) = timed(clock, || toned.encode());
    let result = result?;
    let encode = StageDiagnostics {
        duration: t,
        metrics: StageMetrics::Encode {
            quality: crate::codec::jpeg_quality_percent(config.jpeg_quality),
            output_bytes: result.jpeg.len(),
            width: result.dimensions.width,
            height: result.dimensions.height,
        },
    };

    let total_duration = clock.elapsed(&run_start);
    let summary = PipelineSummary {
        source_width: result.source_dimensions.width,
        source_height: result.source_dimensions.height,
        output_width: result.dimensions.width,
        output_height: result.dimensions.height,
        boundary: result.boundary.kind().to_owned(),
        rotation_degrees: result.rotation.degrees(),
        output_bytes: result.jpeg.len(),
    };
    info!(
        total_ms = duration_ms(total_duration),
        boundary = %summary.boundary,
        rotation = summary.rotation_degrees,
        "pipeline finished"
    );

    Ok((
        result,
        PipelineDiagnostics {
            decode,
            boundary,
            rectify,
            orientation,
            illumination,
            tone,
            encode,
            total_duration,
            summary,
        },
    ))
}
