//! Conversion envelope handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{error, info, warn};

use dicomvid_models::{is_truthy, ConversionBody, ConversionOptions, InvokeRequest, InvokeResponse};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Message of a successful conversion body.
pub const CONVERSION_SUCCESS_MESSAGE: &str = "Conversion successful";

/// Envelope returned as JSON with its status code mirrored on the HTTP response.
#[derive(Debug, Clone)]
pub struct Envelope(pub InvokeResponse);

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

/// Handle an invocation: ping, conversion, or rejection.
pub async fn invoke(State(state): State<AppState>, body: Bytes) -> Envelope {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            warn!("Rejecting request body that is not a JSON object");
            metrics::record_invocation("invalid");
            return Envelope(InvokeResponse::invalid_request());
        }
        Err(e) => {
            warn!("Rejecting malformed request body: {}", e);
            metrics::record_invocation("invalid");
            return Envelope(InvokeResponse::invalid_request());
        }
    };

    // Answered before the rest of the body is looked at
    if value.get("ping").is_some_and(is_truthy) {
        metrics::record_invocation("ping");
        return Envelope(InvokeResponse::pong());
    }

    let request: InvokeRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting request with invalid options: {}", e);
            metrics::record_invocation("invalid");
            let err = ApiError::bad_request(format!("Invalid request options: {e}"));
            return Envelope(err.to_envelope(state.config.is_production()));
        }
    };

    let Some(data) = request.dicom_data.as_deref() else {
        metrics::record_invocation("invalid");
        return Envelope(InvokeResponse::invalid_request());
    };

    metrics::record_invocation("convert");
    let options = request.options(&state.config.defaults);
    match convert(&state, data, &options).await {
        Ok(body) => Envelope(InvokeResponse::json(200, &body).with_json_content_type()),
        Err(e) => {
            error!("Conversion request failed: {}", e);
            Envelope(e.to_envelope(state.config.is_production()))
        }
    }
}

/// Decode, convert and re-encode one DICOM payload inside a scratch directory.
async fn convert(state: &AppState, data: &str, options: &ConversionOptions) -> ApiResult<ConversionBody> {
    let bytes = STANDARD.decode(data.trim())?;
    info!(bytes = bytes.len(), "Received DICOM payload");

    let scratch = scratch_dir(state)?;
    let input = scratch.path().join("input.dcm");
    let output = scratch.path().join("output.mp4");
    tokio::fs::write(&input, &bytes).await?;
    drop(bytes);

    let report = state.converter.convert(&input, &output, options).await?;
    let mp4 = tokio::fs::read(&output).await?;

    Ok(ConversionBody {
        message: CONVERSION_SUCCESS_MESSAGE.to_string(),
        mp4_data: STANDARD.encode(mp4),
        frames: report.frames,
        width: report.width,
        height: report.height,
        warnings: report.warnings,
    })
}

fn scratch_dir(state: &AppState) -> ApiResult<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("dicomvid-request-");
    let dir = match &state.config.work_dir {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            builder.tempdir_in(parent)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}
