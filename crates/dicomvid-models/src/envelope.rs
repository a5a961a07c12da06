//! Request/response envelope of the serving boundary.
//!
//! The envelope mirrors a serverless function invocation: the request carries
//! base64 DICOM bytes (or a ping flag), the response carries a numeric status
//! code and a JSON-encoded body string.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoding::QualityTier;
use crate::job::ConversionOptions;
use crate::normalization::NormalizationStrategy;

/// Message returned when the request carries neither a ping nor DICOM data.
pub const INVALID_REQUEST_MESSAGE: &str =
    "Invalid request. Send DICOM data as base64 in dicom_data field.";

/// Incoming invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvokeRequest {
    /// Health probe; any truthy value is answered without touching the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<Value>,

    /// Base64-encoded DICOM file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dicom_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTier>,

    /// Target bitrate in bits per second; takes precedence over `quality`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<NormalizationStrategy>,
}

impl InvokeRequest {
    /// Merge request overrides onto server defaults.
    pub fn options(&self, defaults: &ConversionOptions) -> ConversionOptions {
        ConversionOptions {
            framerate: self.framerate.unwrap_or(defaults.framerate),
            quality: self.quality.unwrap_or(defaults.quality),
            bitrate: self.bitrate.or(defaults.bitrate),
            normalization: self.normalization.unwrap_or(defaults.normalization),
            validate: defaults.validate,
        }
    }
}

/// Truthiness of a loosely typed JSON flag: null, false, zero and empty
/// strings or collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Outgoing envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvokeResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    /// JSON-encoded body
    pub body: String,
}

impl InvokeResponse {
    /// Build an envelope around a serializable body.
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        let body = serde_json::to_string(body)
            .unwrap_or_else(|e| format!(r#"{{"error":"failed to encode body: {e}"}}"#));
        Self {
            status_code,
            headers: None,
            body,
        }
    }

    /// Attach a `Content-Type: application/json` header.
    pub fn with_json_content_type(mut self) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    /// Fixed health response.
    pub fn pong() -> Self {
        Self::json(200, &PongBody::healthy())
    }

    /// Error envelope carrying a message.
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self::json(
            status_code,
            &ErrorBody {
                error: message.into(),
            },
        )
    }

    /// 400 envelope for requests with neither ping nor data.
    pub fn invalid_request() -> Self {
        Self::error(400, INVALID_REQUEST_MESSAGE)
    }
}

/// Body of the ping response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PongBody {
    pub message: String,
    pub status: String,
}

impl PongBody {
    pub fn healthy() -> Self {
        Self {
            message: "pong".to_string(),
            status: "healthy".to_string(),
        }
    }
}

/// Body of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConversionBody {
    pub message: String,
    /// Base64-encoded MP4
    pub mp4_data: String,
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    /// Advisory decode-check findings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Body of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub error: String,
}
