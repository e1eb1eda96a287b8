//! Latest per-device readings.
//!
//! The persistence worker rewrites `devices/{id}/{section}` on every
//! accepted sample; these handlers serve that tree as stored. A device
//! with nothing stored reads as `{}`.

use axum::{
    extract::{Path, State},
    Json,
};
use resq_core::validate_device_id;
use serde_json::{json, Value};
use store::paths::{self, DeviceSection};

use crate::extractors::AuthContext;
use crate::response::ApiError;
use crate::state::AppState;

async fn read_or_empty(state: &AppState, path: &str) -> Result<Json<Value>, ApiError> {
    let value = state.store.get(path).await?;
    Ok(Json(value.unwrap_or_else(|| json!({}))))
}

async fn section(
    state: &AppState,
    device_id: &str,
    section: DeviceSection,
) -> Result<Json<Value>, ApiError> {
    validate_device_id(device_id)?;
    read_or_empty(state, &paths::device_section(device_id, section)).await
}

/// GET /api/devices/:device_id/sensor-data - Every section of one device.
pub async fn readings_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    validate_device_id(&device_id)?;
    read_or_empty(&state, &paths::device(&device_id)).await
}

/// GET /api/devices/all/sensor-data - The whole device tree, keyed by id.
pub async fn all_readings_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Value>, ApiError> {
    read_or_empty(&state, paths::node::DEVICES).await
}

/// GET /api/devices/:device_id/cpr
pub async fn cpr_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    section(&state, &device_id, DeviceSection::Cpr).await
}

/// GET /api/devices/:device_id/environment
pub async fn environment_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    section(&state, &device_id, DeviceSection::Environment).await
}

/// GET /api/devices/:device_id/gesture
pub async fn gesture_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    section(&state, &device_id, DeviceSection::Gesture).await
}

/// GET /api/devices/:device_id/status
pub async fn status_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    section(&state, &device_id, DeviceSection::Status).await
}
