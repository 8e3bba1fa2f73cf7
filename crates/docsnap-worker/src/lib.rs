//! Web worker entry point for docsnap document normalization.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It receives a captured photo and a `PipelineConfig` via
//! `postMessage`, runs the pipeline with diagnostics, and posts the
//! encoded JPEG back as a raw `Uint8Array`.
//!
//! Running the pipeline in a worker keeps the browser's main thread
//! free for the device preview streams.
//!
//! Message protocol: the main thread sends a JS object with:
//! - `imageBytes`: `Uint8Array` containing the encoded capture
//! - `configJson`: `String` containing JSON-serialized `PipelineConfig`
//! - `generation`: `f64` generation counter (passed through to response)
//!
//! The worker responds with a JS object containing:
//! - `generation`: `f64` matching the request generation
//! - `ok`: `bool`
//! - `enhanced`: `bool`, `false` when `jpegBytes` is the untouched input
//! - `jpegBytes`: `Uint8Array`
//! - `diagnosticsJson`: `String` on success, JSON `PipelineDiagnostics`
//! - `errorJson`: `String` on failure, JSON `PipelineError`

use std::time::Duration;

use docsnap_pipeline::diagnostics::{Clock, process_with_diagnostics};
use docsnap_pipeline::{PipelineConfig, PipelineError};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// [`Clock`] backed by `performance.now()` in the browser.
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// What the worker sends back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The pipeline succeeded.
    pub ok: bool,
    /// `jpeg_bytes` came from the pipeline rather than the input.
    pub enhanced: bool,
    /// Normalized JPEG, or the original capture on failure.
    pub jpeg_bytes: Vec<u8>,
    /// Serialized diagnostics, on success.
    pub diagnostics_json: Option<String>,
    /// Serialized error, on failure.
    pub error_json: Option<String>,
}

impl Reply {
    fn failed(original: Vec<u8>, error: &PipelineError) -> Self {
        let error_json = serde_json::to_string(error)
            .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));
        Self {
            ok: false,
            enhanced: false,
            jpeg_bytes: original,
            diagnostics_json: None,
            error_json: Some(error_json),
        }
    }
}

/// Parse the config and run the pipeline on one capture.
#[must_use]
pub fn run_request(image_bytes: Vec<u8>, config_json: &str) -> Reply {
    let config: PipelineConfig = match serde_json::from_str(config_json) {
        Ok(c) => c,
        Err(e) => {
            let error = PipelineError::InvalidConfig(format!("failed to parse config: {e}"));
            return Reply::failed(image_bytes, &error);
        }
    };

    match process_with_diagnostics(&image_bytes, &config, &WebClock) {
        Ok((result, diagnostics)) => Reply {
            ok: true,
            enhanced: true,
            jpeg_bytes: result.jpeg,
            diagnostics_json: serde_json::to_string(&diagnostics).ok(),
            error_json: None,
        },
        Err(e) => Reply::failed(image_bytes, &e),
    }
}

/// Worker entry point.
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() else {
        wasm_bindgen::throw_str("not running in a DedicatedWorkerGlobalScope");
    };

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // lives for the worker lifetime
}

/// Pull `imageBytes` and `configJson` out of a request object.
fn read_request(data: &JsValue) -> Result<(Vec<u8>, String), String> {
    let field = |name: &str| {
        js_sys::Reflect::get(data, &JsValue::from_str(name))
            .map_err(|_| format!("missing {name} field"))
    };
    let image_bytes = field("imageBytes")?
        .dyn_into::<js_sys::Uint8Array>()
        .map_err(|_| "imageBytes is not a Uint8Array".to_owned())?
        .to_vec();
    let config_json = field("configJson")?
        .as_string()
        .ok_or_else(|| "configJson is not a string".to_owned())?;
    Ok((image_bytes, config_json))
}

/// Handle an incoming message from the main thread.
fn handle_message(event: &web_sys::MessageEvent) {
    let data = event.data();
    let generation = js_sys::Reflect::get(&data, &JsValue::from_str("generation"))
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(-1.0);

    let reply = match read_request(&data) {
        Ok((image_bytes, config_json)) => run_request(image_bytes, &config_json),
        Err(msg) => Reply::failed(Vec::new(), &PipelineError::InvalidConfig(msg)),
    };
    post_reply(generation, &reply);
}

/// Post a reply back to the main thread.
fn post_reply(generation: f64, reply: &Reply) {
    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        let _ = js_sys::Reflect::set(&response, &JsValue::from_str(key), val);
    };

    set("generation", &JsValue::from_f64(generation));
    set("ok", &JsValue::from_bool(reply.ok));
    set("enhanced", &JsValue::from_bool(reply.enhanced));
    set(
        "jpegBytes",
        &js_sys::Uint8Array::from(reply.jpeg_bytes.as_slice()),
    );
    if let Some(ref json) = reply.diagnostics_json {
        set("diagnosticsJson", &JsValue::from_str(json));
    }
    if let Some(ref json) = reply.error_json {
        set("errorJson", &JsValue::from_str(json));
    }

    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(&response);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use docsnap_pipeline::diagnostics::PipelineDiagnostics;
    use docsnap_pipeline::{PixelBuffer, codec};

    use super::*;

    fn capture() -> Vec<u8> {
        codec::encode(&PixelBuffer::filled(40, 30, [200, 190, 180]), 0.9).unwrap()
    }

    #[test]
    fn success_carries_diagnostics() {
        let config_json = serde_json::to_string(&PipelineConfig::default()).unwrap();
        let reply = run_request(capture(), &config_json);
        assert!(reply.ok && reply.enhanced);
        assert!(reply.error_json.is_none());
        let diag: PipelineDiagnostics =
            serde_json::from_str(reply.diagnostics_json.as_deref().unwrap()).unwrap();
        assert_eq!(diag.summary.output_bytes, reply.jpeg_bytes.len());
    }

    #[test]
    fn partial_config_json_uses_defaults() {
        let reply = run_request(capture(), r#"{"tone_curve": false}"#);
        assert!(reply.ok);
    }

    #[test]
    fn bad_config_returns_original() {
        let original = capture();
        let reply = run_request(original.clone(), "not json");
        assert!(!reply.ok && !reply.enhanced);
        assert_eq!(reply.jpeg_bytes, original);
        let error: PipelineError =
            serde_json::from_str(reply.error_json.as_deref().unwrap()).unwrap();
        assert!(matches!(error, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn undecodable_capture_returns_original() {
        let config_json = serde_json::to_string(&PipelineConfig::default()).unwrap();
        let reply = run_request(b"nope".to_vec(), &config_json);
        assert!(!reply.ok);
        assert_eq!(reply.jpeg_bytes, b"nope");
        let error: PipelineError =
            serde_json::from_str(reply.error_json.as_deref().unwrap()).unwrap();
        assert!(matches!(error, PipelineError::ImageDecode(_)));
    }
}
