//! Background capture runner with supersede semantics.
//!
//! Every submission takes the next [`Generation`]. The pipeline runs on
//! tokio's blocking pool; when it finishes, the result is published only
//! if no newer submission has been made since. A run that exceeds
//! `max_wait` resolves with the original input. The blocking task itself
//! cannot be cancelled and is left to finish in the background.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use docsnap_pipeline::{CaptureOutput, PipelineConfig, normalize_capture};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capture::{NormalizedCapture, normalize_data_url};

/// Monotonically increasing submission token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// The raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Pipeline settings for every run.
    pub pipeline: PipelineConfig,
    /// Upper bound on how long a caller waits for one run.
    #[serde(with = "duration_secs")]
    pub max_wait: Duration,
}

impl RunnerConfig {
    /// Default for [`max_wait`](Self::max_wait).
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(20);
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            max_wait: Self::DEFAULT_MAX_WAIT,
        }
    }
}

/// `Duration` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    /// The run was still the latest submission; here is its output.
    Published(T),
    /// A newer submission arrived first; the output was dropped.
    Superseded {
        /// The generation of this run.
        generation: Generation,
        /// The latest generation at completion time.
        latest: Generation,
    },
}

impl<T> RunOutcome<T> {
    /// The published output, if any.
    #[must_use]
    pub fn published(self) -> Option<T> {
        match self {
            Self::Published(out) => Some(out),
            Self::Superseded { .. } => None,
        }
    }
}

/// Runs the pipeline off the calling task and discards stale results.
///
/// Cheap to clone; clones share the generation counter.
#[derive(Debug, Clone)]
pub struct CaptureRunner {
    config: Arc<RunnerConfig>,
    latest: Arc<AtomicU64>,
}

impl CaptureRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config: Arc::new(config),
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The runner's settings.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The most recently issued generation.
    #[must_use]
    pub fn latest(&self) -> Generation {
        Generation(self.latest.load(Ordering::SeqCst))
    }

    /// Issue the next generation, superseding every earlier one.
    pub fn next_generation(&self) -> Generation {
        Generation(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// `true` if `generation` is still the latest.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.latest() == generation
    }

    /// Normalize encoded image bytes under a fresh generation.
    pub async fn run(&self, image_bytes: Vec<u8>) -> RunOutcome<CaptureOutput> {
        let generation = self.next_generation();
        self.run_as(generation, image_bytes).await
    }

    /// Normalize encoded image bytes under an already-issued generation.
    #[instrument(skip(self, image_bytes), fields(input_bytes = image_bytes.len()))]
    pub async fn run_as(
        &self,
        generation: Generation,
        image_bytes: Vec<u8>,
    ) -> RunOutcome<CaptureOutput> {
        let input: Arc<[u8]> = image_bytes.into();
        let worker_input = Arc::clone(&input);
        let config = Arc::clone(&self.config);
        self.dispatch(
            generation,
            move || normalize_capture(&worker_input, &config.pipeline),
            move || CaptureOutput {
                bytes: input.to_vec(),
                enhanced: false,
            },
        )
        .await
    }

    /// Normalize a data URL or bare base64 payload under a fresh generation.
    pub async fn run_data_url(&self, input: String) -> RunOutcome<NormalizedCapture> {
        let generation = self.next_generation();
        let input: Arc<str> = input.into();
        let worker_input = Arc::clone(&input);
        let config = Arc::clone(&self.config);
        self.dispatch(
            generation,
            move || normalize_data_url(&worker_input, &config.pipeline),
            move || NormalizedCapture {
                data_url: input.to_string(),
                enhanced: false,
            },
        )
        .await
    }

    async fn dispatch<T, W, F>(&self, generation: Generation, work: W, fallback: F) -> RunOutcome<T>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        F: FnOnce() -> T,
    {
        let handle = tokio::task::spawn_blocking(work);
        let output = match tokio::time::timeout(self.config.max_wait, handle).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(generation = generation.get(), error = %e, "pipeline task failed");
                fallback()
            }
            Err(_) => {
                warn!(
                    generation = generation.get(),
                    max_wait_secs = self.config.max_wait.as_secs_f64(),
                    "pipeline run timed out, keeping the original capture"
                );
                fallback()
            }
        };

        let latest = self.latest();
        if latest == generation {
            info!(generation = generation.get(), "capture published");
            RunOutcome::Published(output)
        } else {
            debug!(
                generation = generation.get(),
                latest = latest.get(),
                "discarding superseded capture"
            );
            RunOutcome::Superseded { generation, latest }
        }
    }
}

impl Default for CaptureRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}
