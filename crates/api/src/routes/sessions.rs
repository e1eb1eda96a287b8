//! Live and stored CPR sessions.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use resq_core::{validate_device_id, SessionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::paths;
use tracing::info;
use uuid::Uuid;

use crate::extractors::AuthContext;
use crate::response::ApiError;
use crate::state::AppState;

/// Default page size for session listings.
const DEFAULT_LIST_LIMIT: usize = 100;

/// GET /api/devices/:device_id/session - The device's open session.
pub async fn current_session_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Json<SessionState>, ApiError> {
    validate_device_id(&device_id)?;
    state
        .gateway
        .current_session(&device_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No open session for {}", device_id)))
}

/// POST /api/devices/:device_id/session/close - Close the open session.
pub async fn close_session_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let closed = state
        .gateway
        .close_session(&device_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No open session for {}", device_id)))?;

    info!(
        device_id = %device_id,
        session_id = %closed.session_id(),
        uid = %auth.uid,
        "Session closed on request"
    );

    Ok(Json(closed.to_record()))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// GET /api/sessions - Most recent stored sessions.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let mut sessions = stored_sessions(&state).await?;

    sessions.sort_by_key(|s| s.get("start_time").and_then(Value::as_i64).unwrap_or(0));
    let skip = sessions.len().saturating_sub(limit);

    Ok(Json(sessions.into_iter().skip(skip).collect()))
}

/// GET /api/sessions/:session_id - A stored session.
pub async fn get_session_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = Uuid::parse_str(&session_id)
        .map_err(|_| ApiError::not_found(format!("Session {} not found", session_id)))?;

    state
        .store
        .get(&paths::session(&id.to_string()))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Session {} not found", session_id)))
}

/// Aggregates over stored sessions.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub total_sessions: usize,
    /// Sessions currently open in the gateway
    pub active_sessions: usize,
    pub average_compressions: f64,
    pub average_quality: f64,
    pub average_rate: f64,
    pub average_depth: f64,
}

/// GET /api/sessions/analytics/overview
pub async fn analytics_handler(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<AnalyticsOverview>, ApiError> {
    let sessions = stored_sessions(&state).await?;

    let mean = |key: &str| -> f64 {
        if sessions.is_empty() {
            return 0.0;
        }
        let total: f64 = sessions
            .iter()
            .map(|s| s.get(key).and_then(Value::as_f64).unwrap_or(0.0))
            .sum();
        total / sessions.len() as f64
    };

    Ok(Json(AnalyticsOverview {
        total_sessions: sessions.len(),
        active_sessions: state.gateway.open_session_count(),
        average_compressions: mean("total_compressions"),
        average_quality: mean("quality_score"),
        average_rate: mean("average_rate"),
        average_depth: mean("average_depth"),
    }))
}

async fn stored_sessions(state: &AppState) -> Result<Vec<Value>, ApiError> {
    let sessions = match state.store.get(paths::node::SESSIONS).await? {
        Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    };
    Ok(sessions)
}
