//! Emergency event endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use engine::now_ms;
use serde::Deserialize;
use serde_json::{json, Value};
use store::{paths, NO_LIMIT};
use tracing::info;
use uuid::Uuid;

use crate::extractors::{AuthContext, JsonObject};
use crate::response::ApiError;
use crate::state::AppState;

/// Most active emergencies returned at once.
const ACTIVE_LIMIT: usize = 100;

/// GET /api/emergency/active - The newest active emergencies, oldest first.
pub async fn active_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Vec<Value>>, ApiError> {
    // Keys are random, so the cut has to follow the event time.
    let rows = state
        .store
        .query_ordered_by_child(paths::node::EMERGENCIES, "status", &json!("active"), NO_LIMIT)
        .await?;

    let mut active: Vec<Value> = rows.into_iter().map(|(_, v)| v).collect();
    active.sort_by_key(|e| e.get("timestamp").and_then(Value::as_i64).unwrap_or(0));
    let skip = active.len().saturating_sub(ACTIVE_LIMIT);

    Ok(Json(active.into_iter().skip(skip).collect()))
}

/// Body of a manual emergency signal.
#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub device_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_signal_status")]
    pub status: String,
}

fn default_signal_status() -> String {
    "active".to_string()
}

/// POST /api/emergency/signal - A responder raises an emergency by hand.
pub async fn signal_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    JsonObject(body): JsonObject,
) -> Result<Json<Value>, ApiError> {
    let request: SignalRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let event = state.gateway.manual_event(&request.device_id, now_ms())?;
    let mut record = event.to_record();
    if let Value::Object(map) = &mut record {
        map.retain(|_, v| !v.is_null());
        map.insert("location".into(), json!(request.location));
        map.insert("status".into(), json!(request.status));
        map.insert("raised_by".into(), json!(auth.uid));
    }

    state
        .store
        .set(&paths::emergency(&event.id.to_string()), record.clone())
        .await?;
    state.gateway.announce(&event);

    info!(event_id = %event.id, device_id = %event.device_id, uid = %auth.uid, "Emergency signalled");
    Ok(Json(record))
}

/// PUT /api/emergency/:id - Partial update, typically `{"status": "resolved"}`.
pub async fn update_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    JsonObject(mut patch): JsonObject,
) -> Result<Json<Value>, ApiError> {
    let not_found = || ApiError::not_found(format!("Emergency {} not found", id));

    let event_id = Uuid::parse_str(&id).map_err(|_| not_found())?;
    let path = paths::emergency(&event_id.to_string());

    if state.store.get(&path).await?.is_none() {
        return Err(not_found());
    }

    // Identity fields are owned by the detector.
    patch.remove("id");
    patch.remove("device_id");
    patch.insert("updated_at".into(), json!(chrono::Utc::now().timestamp_millis()));
    patch.insert("updated_by".into(), json!(auth.uid));

    state.store.update(&path, patch).await?;
    info!(event_id = %event_id, uid = %auth.uid, "Emergency updated");

    let updated = state.store.get(&path).await?.ok_or_else(not_found)?;
    Ok(Json(updated))
}
