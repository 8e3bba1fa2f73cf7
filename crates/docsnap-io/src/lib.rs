//! docsnap-io: host integration for the docsnap pipeline.
//!
//! Everything the pipeline deliberately leaves out lives here: base64
//! data URLs as the hardware service delivers them, the service's
//! request/response messages, photo dedup, download filenames, and a
//! runner that executes the pipeline off the caller's thread and drops
//! results that a newer capture has superseded.

pub mod capture;
pub mod data_url;
pub mod dedup;
pub mod error;
pub mod filename;
pub mod protocol;
pub mod runner;

pub use capture::{NormalizedCapture, normalize_data_url};
pub use data_url::DataUrl;
pub use dedup::{Fingerprint, PhotoDedup};
pub use error::IoError;
pub use filename::download_filename;
pub use protocol::{DeviceMethod, DeviceType, HardwareRequest, HardwareResponse};
pub use runner::{CaptureRunner, Generation, RunOutcome, RunnerConfig};
