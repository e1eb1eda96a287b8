//! Bearer token parsing and the token verifier contract.
//!
//! Dashboards and responders authenticate with an ID token issued by the
//! identity provider. The gateway never inspects the token itself; it
//! hands it to a `TokenVerifier` and gets back a user ID.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthErrorCode, Error, Result};

/// A bearer token extracted from an `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Extract a token from an `Authorization` header.
///
/// Accepts `Bearer <token>` and, for older dashboards, a bare token.
pub fn extract_bearer(header: Option<&str>) -> Result<BearerToken> {
    let header = header.map(str::trim).unwrap_or_default();
    if header.is_empty() {
        return Err(Error::unauthorized(
            AuthErrorCode::MissingToken,
            "No authorization header",
        ));
    }

    let token = match header.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => {
            return Err(Error::unauthorized(
                AuthErrorCode::InvalidFormat,
                "Authorization header must use the Bearer scheme",
            ))
        }
        None => header,
    };

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(Error::unauthorized(
            AuthErrorCode::InvalidFormat,
            "Malformed bearer token",
        ));
    }

    Ok(BearerToken(token.to_string()))
}

/// Verifies an `Authorization` header and resolves the caller's user ID.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_token(&self, header: Option<&str>) -> Result<String>;
}

/// Request to the token verification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub id_token: String,
}

/// Response from the token verification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub uid: Option<String>,
    pub error: Option<String>,
}

impl VerifyResponse {
    /// Resolve the user ID or the rejection.
    pub fn uid(&self) -> Result<&str> {
        if !self.valid {
            let msg = self.error.as_deref().unwrap_or("Invalid token");
            return Err(Error::unauthorized(AuthErrorCode::InvalidToken, msg));
        }

        self.uid
            .as_deref()
            .ok_or_else(|| Error::unauthorized(AuthErrorCode::InvalidToken, "Missing uid in response"))
    }
}
