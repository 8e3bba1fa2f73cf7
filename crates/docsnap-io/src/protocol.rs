//! Messages exchanged with the local hardware service.
//!
//! Requests name a device and one method. Responses echo a `func` of the
//! form `<device>-<method>...`, a numeric `result` (0 is success), a
//! human-readable `msg`, and an optional `data` object carrying base64
//! images and parsed fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::IoError;

/// Peripheral addressed by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    /// Webcam with face detection.
    Camera,
    /// High-speed document scanner.
    HighCamera,
    /// ID card reader.
    IdCard,
    /// Passport reader.
    Passport,
    /// Fingerprint scanner.
    Finger,
    /// Signature pad.
    Sign,
}

impl DeviceType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::HighCamera => "highCamera",
            Self::IdCard => "idCard",
            Self::Passport => "passport",
            Self::Finger => "finger",
            Self::Sign => "sign",
        }
    }
}

/// Operation requested of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceMethod {
    /// Start the preview stream.
    Open,
    /// Run face detection on the camera feed.
    FaceDetection,
    /// Stop the preview stream.
    Close,
    /// Capture a still.
    TakePhoto,
    /// Start reading a card or passport.
    StartRead,
    /// Stop reading.
    StopRead,
    /// Start a fingerprint scan.
    StartScan,
    /// Stop the scan.
    StopScan,
    /// Start capturing a signature.
    StartSign,
    /// Stop capturing.
    StopSign,
}

impl DeviceMethod {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::FaceDetection => "faceDetection",
            Self::Close => "close",
            Self::TakePhoto => "takePhoto",
            Self::StartRead => "startRead",
            Self::StopRead => "stopRead",
            Self::StartScan => "startScan",
            Self::StopScan => "stopScan",
            Self::StartSign => "startSign",
            Self::StopSign => "stopSign",
        }
    }
}

/// Fresh request id: five decimal digits, 10000–99999.
#[must_use]
pub fn request_id() -> String {
    (Uuid::new_v4().as_u128() % 90_000 + 10_000).to_string()
}

/// Command sent to the hardware service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareRequest {
    /// Target device.
    pub device_type: DeviceType,
    /// The single method to invoke. The service names this field in the
    /// plural.
    pub device_methods: DeviceMethod,
    /// Request id.
    pub uuid: String,
}

impl HardwareRequest {
    /// Build a request with a fresh id.
    #[must_use]
    pub fn new(device_type: DeviceType, method: DeviceMethod) -> Self {
        Self {
            device_type,
            device_methods: method,
            uuid: request_id(),
        }
    }

    /// Serialize for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, IoError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Reply from the hardware service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareResponse {
    /// Id of the request this answers, when the service echoes it.
    #[serde(default)]
    pub uuid: Option<String>,
    /// `<device>-<method>` plus an optional suffix.
    #[serde(default)]
    pub func: Option<String>,
    /// Human-readable status.
    #[serde(default)]
    pub msg: Option<String>,
    /// 0 on success.
    #[serde(default)]
    pub result: i64,
    /// Payload: base64 images and parsed fields.
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl HardwareResponse {
    /// Parse a message from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] if `text` is not a JSON object of the
    /// expected shape.
    pub fn parse(text: &str) -> Result<Self, IoError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `result == 0`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result == 0
    }

    /// `Ok(self)` on success, otherwise the device's error.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Device`] carrying `result` and `msg`.
    pub fn into_result(self) -> Result<Self, IoError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(IoError::Device {
            code: self.result,
            msg: self.msg.unwrap_or_default(),
        })
    }

    /// `true` if `func` names this device and method.
    #[must_use]
    pub fn is_for(&self, device: DeviceType, method: DeviceMethod) -> bool {
        self.func.as_deref().is_some_and(|func| {
            func.strip_prefix(device.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|rest| rest.starts_with(method.as_str()))
        })
    }

    /// A non-empty string field of `data`.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .as_ref()?
            .get(key)?
            .as_str()
            .filter(|s| !s.is_empty())
    }

    /// The captured still (`data.photoImg`), as bare base64.
    #[must_use]
    pub fn photo_payload(&self) -> Option<&str> {
        self.data_str("photoImg")
    }

    /// The preview frame (`data.previewImg`), as bare base64.
    #[must_use]
    pub fn preview_payload(&self) -> Option<&str> {
        self.data_str("previewImg")
    }
}
