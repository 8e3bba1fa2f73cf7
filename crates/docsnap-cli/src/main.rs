//! docsnap: normalize a photographed document from the command line.
//!
//! Runs the pipeline on an image file, writes the flattened, upright,
//! evenly lit JPEG, and prints per-stage diagnostics. Useful for:
//!
//! - Normalizing captures outside the browser
//! - Comparing boundary strategies (`auto`, `quad`, `bounding-box`)
//! - Tuning thresholds, margins and the orientation tie-break
//! - Measuring per-stage durations to identify bottlenecks
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin docsnap -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use docsnap_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use docsnap_pipeline::{BoundaryStrategy, DownsampleFilter, FillColor, PipelineConfig};
use tracing_subscriber::EnvFilter;

/// Normalize a photographed document.
///
/// Finds the page, removes perspective, picks the upright rotation,
/// evens out lighting, and writes the result as JPEG.
#[derive(Parser)]
#[command(name = "docsnap", version)]
struct Cli {
    /// Path to the input image (JPEG, PNG, BMP, WebP).
    image_path: PathBuf,

    /// Where to write the normalized JPEG [default: <input>-normalized.jpg].
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Working resolution (max dimension in pixels after downsampling).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_WORKING_RESOLUTION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(16..))]
    working_resolution: u32,

    /// Downsample filter (nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    downsample_filter: Filter,

    /// Boundary detection strategy.
    #[arg(long, value_enum, default_value_t = Strategy::Auto)]
    strategy: Strategy,

    /// Minimum document area as a fraction of the frame.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_REGION_FRACTION)]
    min_region_fraction: f64,

    /// Bounding-box margin as a fraction of the shorter frame side.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BBOX_MARGIN)]
    bbox_margin: f64,

    /// Colour painted where the warp samples outside the photo.
    #[arg(long, value_enum, default_value_t = Fill::White)]
    fill: Fill,

    /// Do not trim residual background after rectification.
    #[arg(long)]
    no_overcrop: bool,

    /// Fraction trimmed inward from each side by the overcrop.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OVERCROP_MARGIN)]
    overcrop_margin: f64,

    /// Keep the rectified page as is instead of choosing a rotation.
    #[arg(long)]
    no_orientation: bool,

    /// Do not prefer portrait when rotation scores tie.
    #[arg(long)]
    no_portrait: bool,

    /// Skip flat-field illumination correction.
    #[arg(long)]
    no_illumination: bool,

    /// Skip the document tone curve.
    #[arg(long)]
    no_tone_curve: bool,

    /// JPEG quality in (0, 1].
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_JPEG_QUALITY)]
    quality: f32,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long, conflicts_with = "config")]
    config_json: Option<String>,

    /// Read the full pipeline config from a JSON file.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Log pipeline decisions at debug level (overridden by `RUST_LOG`).
    #[arg(short, long)]
    verbose: bool,
}

/// Downsample resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Disabled: detect on the full-resolution image.
    Disabled,
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Maps a [`DownsampleFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: DownsampleFilter) -> Filter {
    match f {
        DownsampleFilter::Disabled => Filter::Disabled,
        DownsampleFilter::Nearest => Filter::Nearest,
        DownsampleFilter::Triangle => Filter::Triangle,
        DownsampleFilter::CatmullRom => Filter::CatmullRom,
        DownsampleFilter::Gaussian => Filter::Gaussian,
        DownsampleFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// The CLI default filter, derived from [`PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER);

/// Boundary detection strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// Quad first, bounding box when no quad is found.
    Auto,
    /// Only the perspective quad.
    Quad,
    /// Only the axis-aligned bounding box.
    BoundingBox,
}

/// Fill colour selection.
#[derive(Clone, Copy, ValueEnum)]
enum Fill {
    /// Paper white.
    White,
    /// Black.
    Black,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// `--config` and `--config-json` replace the individual flags entirely.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&text)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        working_resolution: cli.working_resolution,
        downsample_filter: match cli.downsample_filter {
            Filter::Disabled => DownsampleFilter::Disabled,
            Filter::Nearest => DownsampleFilter::Nearest,
            Filter::Triangle => DownsampleFilter::Triangle,
            Filter::CatmullRom => DownsampleFilter::CatmullRom,
            Filter::Gaussian => DownsampleFilter::Gaussian,
            Filter::Lanczos3 => DownsampleFilter::Lanczos3,
        },
        boundary_strategy: match cli.strategy {
            Strategy::Auto => BoundaryStrategy::Auto,
            Strategy::Quad => BoundaryStrategy::Quad,
            Strategy::BoundingBox => BoundaryStrategy::BoundingBox,
        },
        min_region_fraction: cli.min_region_fraction,
        bbox_margin: cli.bbox_margin,
        fill: match cli.fill {
            Fill::White => FillColor::White,
            Fill::Black => FillColor::Black,
        },
        overcrop: !cli.no_overcrop,
        overcrop_margin: cli.overcrop_margin,
        orientation: !cli.no_orientation,
        prefer_portrait: !cli.no_portrait,
        illumination: !cli.no_illumination,
        tone_curve: !cli.no_tone_curve,
        jpeg_quality: cli.quality,
        ..PipelineConfig::default()
    })
}

/// `<dir>/<stem>-normalized.jpg` next to the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("capture");
    input.with_file_name(format!("{stem}-normalized.jpg"))
}

/// Install a stderr subscriber; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config_from_cli(&cli).and_then(|c| {
        c.validate().map_err(|e| e.to_string())?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.image_path));

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match docsnap_pipeline::diagnostics::process_with_diagnostics(
            &image_bytes,
            &config,
            &StdClock,
        ) {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write the output on the first run only.
                if run == 0 {
                    if let Err(e) = std::fs::write(&output_path, &result.jpeg) {
                        eprintln!("Error writing {}: {e}", output_path.display());
                        return ExitCode::FAILURE;
                    }
                    eprintln!(
                        "Wrote {} ({}x{}, {} bytes)",
                        output_path.display(),
                        result.dimensions.width,
                        result.dimensions.height,
                        result.jpeg.len(),
                    );
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| Some(d.decode.duration)),
        ("Boundary", |d| Some(d.boundary.duration)),
        ("Rectify", |d| Some(d.rectify.duration)),
        ("Orientation", |d| d.orientation.as_ref().map(|s| s.duration)),
        ("Illumination", |d| d.illumination.as_ref().map(|s| s.duration)),
        ("Tone", |d| d.tone.as_ref().map(|s| s.duration)),
        ("Encode", |d| Some(d.encode.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("docsnap").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_pipeline() {
        let cli = parse(&["page.jpg"]);
        assert_eq!(config_from_cli(&cli).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn flags_switch_stages_off() {
        let cli = parse(&[
            "page.jpg",
            "--no-orientation",
            "--no-tone-curve",
            "--strategy",
            "bounding-box",
            "--fill",
            "black",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!(!config.orientation);
        assert!(!config.tone_curve);
        assert!(config.illumination);
        assert_eq!(config.boundary_strategy, BoundaryStrategy::BoundingBox);
        assert_eq!(config.fill, FillColor::Black);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "page.jpg",
            "--no-illumination",
            "--config-json",
            r#"{"jpeg_quality": 0.5}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!(config.illumination);
        assert!((config.jpeg_quality - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn config_sources_conflict() {
        let result = Cli::try_parse_from([
            "docsnap",
            "page.jpg",
            "--config",
            "a.json",
            "--config-json",
            "{}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("scans/page.jpg")),
            PathBuf::from("scans/page-normalized.jpg")
        );
    }
}
