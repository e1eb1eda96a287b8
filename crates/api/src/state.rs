//! Application state shared across handlers.

use async_trait::async_trait;
use engine::Gateway;
use moka::future::Cache;
use reqwest::StatusCode;
use resq_core::{
    error::AuthErrorCode, extract_bearer, Error, Result, TokenVerifier, VerifyRequest,
    VerifyResponse,
};
use std::sync::Arc;
use std::time::Duration;
use store::Store;
use telemetry::health;
use tracing::{debug, warn};

/// Cache TTL for verified tokens (30 seconds).
const AUTH_CACHE_TTL: Duration = Duration::from_secs(30);

/// Maximum cache entries.
const AUTH_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Token verification client.
///
/// Calls the identity service's `/verify` endpoint and caches the
/// resolved user ID for 30 seconds. An empty URL or `"mock"` selects mock
/// mode, where every well-formed token is accepted.
#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    http_client: reqwest::Client,
    /// token -> uid
    cache: Cache<String, String>,
    mock_mode: bool,
}

impl AuthClient {
    /// Creates a new auth client.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mock_mode = base_url.is_empty() || base_url == "mock";

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))?;

        if mock_mode {
            health().auth.set_healthy();
        }

        Ok(Self {
            base_url,
            http_client,
            cache: Cache::builder()
                .max_capacity(AUTH_CACHE_MAX_CAPACITY)
                .time_to_live(AUTH_CACHE_TTL)
                .build(),
            mock_mode,
        })
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode
    }

    /// Verify a raw token, consulting the cache first.
    pub async fn verify(&self, token: &str) -> Result<String> {
        if let Some(uid) = self.cache.get(token).await {
            debug!("Auth cache hit");
            return Ok(uid);
        }

        let uid = if self.mock_mode {
            mock_uid(token)
        } else {
            self.remote_verify(token).await?
        };

        // Only successful verifications are cached.
        self.cache.insert(token.to_string(), uid.clone()).await;
        Ok(uid)
    }

    /// Call the remote verification service.
    async fn remote_verify(&self, token: &str) -> Result<String> {
        let url = format!("{}/verify", self.base_url);
        let request = VerifyRequest {
            id_token: token.to_string(),
        };

        debug!(url = %url, "Calling auth service");

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Auth service request failed");
                health().auth.set_unhealthy(format!("unreachable: {}", e));
                Error::internal(format!("Auth service unavailable: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            health().auth.set_healthy();
            return Err(Error::unauthorized(AuthErrorCode::InvalidToken, "Invalid token"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Auth service returned error");
            health().auth.set_unhealthy(format!("returned {}", status));
            return Err(Error::internal(format!(
                "Auth service returned {}: {}",
                status, body
            )));
        }

        let verify: VerifyResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse auth response");
            Error::internal(format!("Invalid auth response: {}", e))
        })?;

        health().auth.set_healthy();
        verify.uid().map(str::to_string)
    }
}

#[async_trait]
impl TokenVerifier for AuthClient {
    async fn verify_token(&self, header: Option<&str>) -> Result<String> {
        let token = extract_bearer(header)?;
        self.verify(token.as_str()).await
    }
}

/// Deterministic mock user ID for a token.
fn mock_uid(token: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    format!("mock-{:016x}", hasher.finish())
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Store for read-side endpoints
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, store: Arc<dyn Store>, auth: Arc<dyn TokenVerifier>) -> Self {
        Self {
            gateway,
            store,
            auth,
        }
    }
}
