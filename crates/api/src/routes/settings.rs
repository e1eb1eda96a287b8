//! Per-user settings stored under `users/{uid}`.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use store::paths;

use crate::extractors::{AuthContext, JsonObject};
use crate::response::{ApiError, StatusResponse};
use crate::state::AppState;

/// GET /api/settings - Empty object when nothing is stored yet.
pub async fn get_settings_handler(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Value>, ApiError> {
    let settings = state
        .store
        .get(&paths::user(&auth.uid))
        .await?
        .unwrap_or_else(|| json!({}));
    Ok(Json(settings))
}

/// PUT /api/settings - Merge the body into the stored settings.
pub async fn put_settings_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    JsonObject(patch): JsonObject,
) -> Result<Json<StatusResponse>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::bad_request("Settings body is empty"));
    }

    state.store.update(&paths::user(&auth.uid), patch).await?;
    Ok(Json(StatusResponse::success().with_message("Settings updated")))
}
