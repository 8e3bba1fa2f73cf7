//! Errors raised while parsing host inputs.

/// Errors from data-URL decoding, hardware messages and the runner.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The input looked like a data URL but was not a base64 one.
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// The base64 payload could not be decoded.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A hardware message was not valid JSON of the expected shape.
    #[error("malformed hardware message: {0}")]
    Json(#[from] serde_json::Error),

    /// The hardware service answered with a non-zero result code.
    #[error("device reported failure {code}: {msg}")]
    Device {
        /// The `result` field of the response.
        code: i64,
        /// The `msg` field of the response.
        msg: String,
    },
}
