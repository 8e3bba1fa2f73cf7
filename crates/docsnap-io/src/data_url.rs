//! Base64 data URLs.
//!
//! The hardware service sends images as bare base64 strings; the
//! dashboard wraps them as `data:image/jpeg;base64,<payload>`. Both forms
//! are accepted on input. Output is always the full data URL.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::IoError;

/// MIME type of everything the pipeline produces.
pub const JPEG_MIME: &str = "image/jpeg";

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A decoded data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Media type, e.g. `image/jpeg`.
    pub mime: String,
    /// Decoded payload.
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Wrap JPEG bytes.
    #[must_use]
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            mime: JPEG_MIME.to_owned(),
            bytes,
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL or a bare base64 payload.
    ///
    /// Bare payloads are assumed to be JPEG. Surrounding whitespace is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidDataUrl`] for a `data:` URL without a
    /// base64 marker or with an empty payload, and [`IoError::Base64`]
    /// when the payload does not decode.
    pub fn parse(input: &str) -> Result<Self, IoError> {
        let input = input.trim();
        let (mime, payload) = match input.strip_prefix(SCHEME) {
            Some(rest) => {
                let (mime, payload) = rest
                    .split_once(BASE64_MARKER)
                    .ok_or_else(|| IoError::InvalidDataUrl("missing ;base64, marker".into()))?;
                let mime = if mime.is_empty() { JPEG_MIME } else { mime };
                (mime, payload)
            }
            None => (JPEG_MIME, input),
        };
        if payload.is_empty() {
            return Err(IoError::InvalidDataUrl("empty payload".into()));
        }
        Ok(Self {
            mime: mime.to_owned(),
            bytes: STANDARD.decode(payload)?,
        })
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}{BASE64_MARKER}{}",
            self.mime,
            STANDARD.encode(&self.bytes)
        )
    }
}
