//! Read side of the legacy IoT endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use resq_core::validate_device_id;
use serde::Deserialize;
use serde_json::{json, Value};
use store::paths;

use crate::extractors::AuthContext;
use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub device_id: Option<String>,
}

/// GET /api/iot/latest?device_id= - Newest stored sample for a device.
pub async fn latest_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<LatestQuery>,
) -> Result<Json<Value>, ApiError> {
    let device_id = query
        .device_id
        .ok_or_else(|| ApiError::bad_request("device_id query parameter is required"))?;
    validate_device_id(&device_id)?;

    let mut rows = state
        .store
        .query_ordered_by_child(paths::node::SENSOR_DATA, "device_id", &json!(device_id), 1)
        .await?;

    rows.pop()
        .map(|(_, sample)| Json(sample))
        .ok_or_else(|| ApiError::not_found(format!("No samples stored for {}", device_id)))
}
