//! Device sample ingestion.
//!
//! Devices post either to their own path or to the legacy flat endpoint
//! that carries `device_id` in the body. Both accept the flat and the
//! sectioned (`cpr`/`environment`/`gesture`/`status`) payloads.

use axum::extract::{Path, State};
use resq_core::{error::SampleErrorCode, Error};
use serde_json::Value;
use tracing::debug;

use crate::extractors::JsonObject;
use crate::response::{ApiError, IngestResponse};
use crate::state::AppState;

/// POST /api/devices/:device_id/sensor-data
pub async fn device_ingest_handler(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    JsonObject(body): JsonObject,
) -> Result<IngestResponse, ApiError> {
    let receipt = state.gateway.ingest(&device_id, &Value::Object(body)).await?;

    debug!(
        device_id = %device_id,
        accepted = receipt.accepted,
        overall = ?receipt.score.map(|s| s.overall),
        events = receipt.events.len(),
        "Sample ingested"
    );

    Ok(receipt.into())
}

/// POST /api/iot/sensor-data
pub async fn legacy_ingest_handler(
    State(state): State<AppState>,
    JsonObject(body): JsonObject,
) -> Result<IngestResponse, ApiError> {
    let device_id = body
        .get("device_id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::invalid_sample(
                SampleErrorCode::MissingField,
                "device_id",
                "device_id is required",
            )
        })?
        .to_string();

    let receipt = state.gateway.ingest(&device_id, &Value::Object(body)).await?;
    Ok(receipt.into())
}
