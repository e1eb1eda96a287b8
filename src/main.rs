//! ResqPulse telemetry gateway
//!
//! Accepts CPR sensor samples from field devices and turns them into:
//! - per-sample quality scores
//! - rolling per-device sessions
//! - SOS, silence and low-quality emergencies
//! - live updates for connected dashboards

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info, warn};
use validator::Validate;

use api::{router, AppState, AuthClient};
use engine::{EngineConfig, Gateway, Scheduler};
use store::{build_store, StoreBackend, StoreConfig};
use telemetry::{health, init_tracing_from_env};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct AppConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    port: u16,

    /// Identity service URL for bearer token verification, `mock` to accept any token
    #[serde(default = "default_auth_url")]
    auth_url: String,

    #[serde(default)]
    store: StoreConfig,

    #[serde(default)]
    #[validate(nested)]
    engine: EngineConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_auth_url() -> String {
    "http://auth-service:8080".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_url: default_auth_url(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting ResqPulse gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config.validate().context("Invalid configuration")?;

    info!(
        backend = ?config.store.backend,
        url = %config.store.url,
        "Loaded store config"
    );

    let store = build_store(&config.store).context("Failed to create store")?;
    if store::health::check_connection(store.as_ref()).await {
        health().store.set_healthy();
        info!("Store connection: healthy");

        let empty = store::health::empty_nodes(store.as_ref()).await;
        if !empty.is_empty() {
            info!(nodes = ?empty, "Store nodes without data");
        }
    } else {
        health().store.set_unhealthy("Connection failed");
        error!("Store connection: unhealthy");
    }
    if config.store.backend == StoreBackend::Memory {
        warn!("Using the in-memory store; nothing survives a restart");
    }

    let auth = AuthClient::new(config.auth_url.as_str()).context("Failed to create auth client")?;
    if auth.is_mock() {
        warn!("Auth running in mock mode; every bearer token is accepted");
    }

    let gateway = Gateway::start(config.engine.clone(), store.clone())
        .context("Failed to start gateway")?;

    // Sweep timer and metrics log
    let scheduler = Arc::new(Scheduler::new(gateway.clone()));
    let scheduler_handles = scheduler.start();

    let state = AppState::new(gateway.clone(), store, Arc::new(auth));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    for handle in scheduler_handles {
        handle.abort();
    }

    // Flush open sessions and drain persistence
    gateway.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<AppConfig> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&AppConfig::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("RESQ")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Nested keys with underscores don't map reliably through the separator.
    if let Ok(url) = std::env::var("RESQ_STORE_URL") {
        config.store.url = url;
    }
    if let Ok(token) = std::env::var("RESQ_STORE_AUTH_TOKEN") {
        config.store.auth_token = Some(token);
    }
    if let Ok(auth_url) = std::env::var("RESQ_AUTH_URL") {
        config.auth_url = auth_url;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
