//! API routes.

pub mod auth;
pub mod devices;
pub mod emergency;
pub mod health;
pub mod ingest;
pub mod iot;
pub mod sessions;
pub mod settings;
pub mod stream;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Devices
        .route("/devices/all/sensor-data", get(devices::all_readings_handler))
        .route(
            "/devices/:device_id/sensor-data",
            get(devices::readings_handler).post(ingest::device_ingest_handler),
        )
        .route("/devices/:device_id/cpr", get(devices::cpr_handler))
        .route("/devices/:device_id/environment", get(devices::environment_handler))
        .route("/devices/:device_id/gesture", get(devices::gesture_handler))
        .route("/devices/:device_id/status", get(devices::status_handler))
        .route("/devices/:device_id/session", get(sessions::current_session_handler))
        .route("/devices/:device_id/session/close", post(sessions::close_session_handler))
        .route("/devices/:device_id/stream", get(stream::stream_handler))
        .route("/iot/sensor-data", post(ingest::legacy_ingest_handler))
        .route("/iot/latest", get(iot::latest_handler))
        // Sessions
        .route("/sessions", get(sessions::list_sessions_handler))
        .route("/sessions/analytics/overview", get(sessions::analytics_handler))
        .route("/sessions/:session_id", get(sessions::get_session_handler))
        // Emergencies
        .route("/emergency/active", get(emergency::active_handler))
        .route("/emergency/signal", post(emergency::signal_handler))
        .route("/emergency/:id", put(emergency::update_handler))
        // Users
        .route(
            "/settings",
            get(settings::get_settings_handler).put(settings::put_settings_handler),
        )
        .route("/auth/user", get(auth::user_handler));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
