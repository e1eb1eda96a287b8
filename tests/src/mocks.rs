//! Mock implementations for testing.

use async_trait::async_trait;
use resq_core::{
    error::{AuthErrorCode, StoreErrorCode},
    extract_bearer, Error, Result, TokenVerifier,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use store::{MemoryStore, Store};

use crate::fixtures::{TEST_TOKEN, TEST_UID};

/// Verifier with a fixed token table.
///
/// Header parsing goes through the same `extract_bearer` as the real
/// client, so missing and malformed headers fail with the same codes.
#[derive(Debug, Clone)]
pub struct StaticVerifier {
    tokens: HashMap<String, String>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::from([(TEST_TOKEN.to_string(), TEST_UID.to_string())]),
        }
    }

    pub fn with_token(mut self, token: &str, uid: &str) -> Self {
        self.tokens.insert(token.to_string(), uid.to_string());
        self
    }
}

impl Default for StaticVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify_token(&self, header: Option<&str>) -> Result<String> {
        let token = extract_bearer(header)?;
        self.tokens
            .get(token.as_str())
            .cloned()
            .ok_or_else(|| Error::unauthorized(AuthErrorCode::InvalidToken, "Invalid token"))
    }
}

/// Store whose writes always fail. Reads see whatever was there before.
#[derive(Debug, Default)]
pub struct DownStore {
    inner: MemoryStore,
    attempts: AtomicU32,
}

impl DownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn refuse(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::persistence(StoreErrorCode::Unavailable, "store is down"))
    }
}

#[async_trait]
impl Store for DownStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.inner.get(path).await
    }

    async fn set(&self, _path: &str, _value: Value) -> Result<()> {
        self.refuse()
    }

    async fn update(&self, _path: &str, _patch: Map<String, Value>) -> Result<()> {
        self.refuse()
    }

    async fn delete(&self, _path: &str) -> Result<()> {
        self.refuse()
    }

    async fn query_ordered_by_child(
        &self,
        path: &str,
        child_key: &str,
        equals: &Value,
        limit: usize,
    ) -> Result<Vec<(String, Value)>> {
        self.inner
            .query_ordered_by_child(path, child_key, equals, limit)
            .await
    }

    async fn ping(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticVerifier::new().with_token("other", "user-2");

        assert_eq!(verifier.verify_token(Some("Bearer test-token")).await.unwrap(), TEST_UID);
        assert_eq!(verifier.verify_token(Some("Bearer other")).await.unwrap(), "user-2");

        let err = verifier.verify_token(Some("Bearer nope")).await.unwrap_err();
        assert_eq!(err.error_code(), Some("AUTH_003"));
    }
}
