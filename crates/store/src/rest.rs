//! Realtime database client over its REST protocol.
//!
//! Every node is addressable as `{url}/{path}.json`. Reads are `GET`,
//! `set` is `PUT`, `update` is `PATCH` and `delete` is `DELETE`. Queries
//! use the `orderBy`/`equalTo`/`limitToLast` parameters, whose values must
//! be JSON-encoded.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use resq_core::{error::StoreErrorCode, Error, Result};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::StoreConfig;
use crate::store::{filter_children, segments, Store, NO_LIMIT};

/// REST-backed store client.
#[derive(Clone)]
pub struct RestStore {
    base_url: Url,
    auth_token: Option<String>,
    http_client: reqwest::Client,
}

impl RestStore {
    /// Creates a new client from config.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid store url {:?}: {}", config.url, e)))?;

        // Url::join treats the last segment as a file unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            auth_token: config.auth_token.clone(),
            http_client,
        })
    }

    /// Resolve `path` into a `.json` resource URL.
    pub fn node_url(&self, path: &str) -> Result<Url> {
        let parts = segments(path)?;
        let resource = if parts.is_empty() {
            ".json".to_string()
        } else {
            format!("{}.json", parts.join("/"))
        };

        let mut url = self
            .base_url
            .join(&resource)
            .map_err(|e| Error::internal(format!("invalid store path {:?}: {}", path, e)))?;

        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }

        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        failure: StoreErrorCode,
    ) -> Result<Value> {
        debug!(method = %method, path = %url.path(), "Store request");

        let mut request = self.http_client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Store request failed");
            Error::persistence(StoreErrorCode::Unavailable, format!("store unreachable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Store returned error");
            let code = if status == StatusCode::SERVICE_UNAVAILABLE {
                StoreErrorCode::Unavailable
            } else {
                failure
            };
            return Err(Error::persistence(
                code,
                format!("{} returned {}: {}", method, status, body),
            ));
        }

        if method == Method::DELETE {
            return Ok(Value::Null);
        }

        response.json::<Value>().await.map_err(|e| {
            Error::persistence(failure, format!("invalid store response: {}", e))
        })
    }
}

#[async_trait]
impl Store for RestStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let url = self.node_url(path)?;
        let value = self
            .send(Method::GET, url, None, StoreErrorCode::ReadFailed)
            .await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let url = self.node_url(path)?;
        self.send(Method::PUT, url, Some(&value), StoreErrorCode::WriteFailed)
            .await?;
        Ok(())
    }

    async fn update(&self, path: &str, patch: Map<String, Value>) -> Result<()> {
        let url = self.node_url(path)?;
        let body = Value::Object(patch);
        self.send(Method::PATCH, url, Some(&body), StoreErrorCode::WriteFailed)
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.node_url(path)?;
        self.send(Method::DELETE, url, None, StoreErrorCode::WriteFailed)
            .await?;
        Ok(())
    }

    async fn query_ordered_by_child(
        &self,
        path: &str,
        child_key: &str,
        equals: &Value,
        limit: usize,
    ) -> Result<Vec<(String, Value)>> {
        let mut url = self.node_url(path)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("orderBy", &Value::String(child_key.to_string()).to_string())
                .append_pair("equalTo", &equals.to_string());
            if limit != NO_LIMIT {
                query.append_pair("limitToLast", &limit.to_string());
            }
        }

        let value = self
            .send(Method::GET, url, None, StoreErrorCode::ReadFailed)
            .await?;

        // The server filters but returns an unordered object; re-apply locally.
        Ok(filter_children(Some(&value), child_key, equals, limit))
    }

    async fn ping(&self) -> bool {
        let Ok(mut url) = self.node_url("") else {
            return false;
        };
        url.query_pairs_mut().append_pair("shallow", "true");

        self.send(Method::GET, url, None, StoreErrorCode::ReadFailed)
            .await
            .is_ok()
    }
}
