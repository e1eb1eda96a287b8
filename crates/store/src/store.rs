//! The key-path store contract.

use async_trait::async_trait;
use resq_core::{Error, Result};
use serde_json::{Map, Value};

/// `limit` for queries that keep every match.
pub const NO_LIMIT: usize = usize::MAX;

/// Characters a path segment may not contain.
const FORBIDDEN: [char; 5] = ['.', '#', '$', '[', ']'];

/// Hierarchical realtime store addressed by `/`-separated paths.
///
/// Semantics follow the realtime-database model: setting `null` deletes,
/// `update` merges the given children without touching siblings, and
/// queries filter a node's direct children.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the value at `path`, `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replace the value at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Merge `patch` into the node at `path`. Keys may be nested paths.
    async fn update(&self, path: &str, patch: Map<String, Value>) -> Result<()>;

    /// Remove the value at `path`.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Children of `path` whose `child_key` equals `equals`, in key order,
    /// keeping the last `limit` ([`NO_LIMIT`] keeps all).
    async fn query_ordered_by_child(
        &self,
        path: &str,
        child_key: &str,
        equals: &Value,
        limit: usize,
    ) -> Result<Vec<(String, Value)>>;

    /// Cheap connectivity check.
    async fn ping(&self) -> bool {
        true
    }
}

/// Split and validate a store path.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    for part in &parts {
        if part.contains(FORBIDDEN) {
            return Err(Error::internal(format!(
                "invalid store path segment {:?} in {:?}",
                part, path
            )));
        }
    }

    Ok(parts)
}

/// Join a base path and a child key.
pub fn join(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", base, child)
    }
}

/// Applies `orderByChild/equalTo/limitToLast` to a node's children.
pub fn filter_children(
    node: Option<&Value>,
    child_key: &str,
    equals: &Value,
    limit: usize,
) -> Vec<(String, Value)> {
    let Some(Value::Object(children)) = node else {
        return Vec::new();
    };

    let mut matched: Vec<(String, Value)> = children
        .iter()
        .filter(|(_, child)| child.get(child_key) == Some(equals))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    matched.sort_by(|a, b| a.0.cmp(&b.0));

    let skip = matched.len().saturating_sub(limit);
    matched.split_off(skip)
}
