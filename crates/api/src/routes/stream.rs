//! Server-sent live updates for a device.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{debug, warn};

use crate::extractors::AuthContext;
use crate::response::ApiError;
use crate::state::AppState;

/// GET /api/devices/:device_id/stream
///
/// Opens with a `snapshot` event carrying the open session (or `null`),
/// then one `update` event per computed update. Dropping the connection
/// unsubscribes.
pub async fn stream_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(device_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let updates = state.gateway.subscribe(&device_id)?;
    let snapshot = state.gateway.current_session(&device_id);

    debug!(device_id = %device_id, uid = %auth.uid, "Live stream opened");

    let first = stream::once(async move { Ok::<_, Infallible>(sse_event("snapshot", &snapshot)) });
    let rest = updates.map(|update| Ok::<_, Infallible>(sse_event("update", &update)));

    Ok(Sse::new(first.chain(rest)).keep_alive(KeepAlive::default()))
}

fn sse_event<T: Serialize>(name: &str, data: &T) -> Event {
    match Event::default().event(name).json_data(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Failed to encode live update");
            Event::default().event("error").data("encoding failed")
        }
    }
}
