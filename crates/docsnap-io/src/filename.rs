//! Download filenames.

use chrono::{DateTime, SecondsFormat, Utc};

/// Purpose prefix for high-speed scanner captures.
pub const SCANNER_PHOTO: &str = "scanner-photo";

/// Purpose prefix for webcam captures.
pub const CAMERA_PHOTO: &str = "camera-photo";

/// `<purpose>-<UTC timestamp>.jpg`, with the timestamp in ISO 8601 at
/// millisecond precision and `:` and `.` replaced by `-`.
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).single().unwrap()
///     + chrono::Duration::milliseconds(123);
/// assert_eq!(
///     docsnap_io::download_filename("scanner-photo", at),
///     "scanner-photo-2026-10-19T08-30-05-123Z.jpg",
/// );
/// ```
#[must_use]
pub fn download_filename(purpose: &str, at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{purpose}-{stamp}.jpg")
}

/// [`download_filename`] for the current time.
#[must_use]
pub fn download_filename_now(purpose: &str) -> String {
    download_filename(purpose, Utc::now())
}
