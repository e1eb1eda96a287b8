//! Request extractors.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
};
use resq_core::{limits::MAX_SAMPLE_SIZE_BYTES, Error};
use serde_json::{Map, Value};

use crate::response::ApiError;
use crate::state::AppState;

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID resolved by the token verifier
    pub uid: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let uid = state.auth.verify_token(auth_header).await?;
        Ok(AuthContext { uid })
    }
}

/// A JSON object body, with parse failures reported as `VALID_004`.
#[derive(Debug, Clone)]
pub struct JsonObject(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for JsonObject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        if body.len() > MAX_SAMPLE_SIZE_BYTES {
            return Err(Error::malformed_sample(format!(
                "Payload size {}KB exceeds {}KB limit",
                body.len() / 1024,
                MAX_SAMPLE_SIZE_BYTES / 1024
            ))
            .into());
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => Ok(JsonObject(map)),
            Ok(_) => Err(Error::malformed_sample("Body must be a JSON object").into()),
            Err(e) => Err(Error::malformed_sample(format!("Invalid JSON: {}", e)).into()),
        }
    }
}
