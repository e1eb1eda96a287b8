//! In-process realtime store.
//!
//! Holds the whole tree as one JSON document. Used for local development
//! and tests; production deployments point `RestStore` at the hosted
//! database.

use async_trait::async_trait;
use parking_lot::RwLock;
use resq_core::{Error, Result};
use serde_json::{Map, Value};

use crate::store::{filter_children, join, segments, Store};

/// Tree-backed store behind a reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entire tree.
    pub fn dump(&self) -> Value {
        Value::Object(self.root.read().clone())
    }

    fn set_in(root: &mut Map<String, Value>, parts: &[&str], value: Value) -> Result<()> {
        let Some((last, parents)) = parts.split_last() else {
            return match value {
                Value::Object(map) => {
                    *root = map;
                    Ok(())
                }
                Value::Null => {
                    root.clear();
                    Ok(())
                }
                _ => Err(Error::internal("store root must be an object")),
            };
        };

        if value.is_null() {
            Self::delete_in(root, parts);
            return Ok(());
        }

        let mut node = root;
        for part in parents {
            let entry = node
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            node = match entry {
                Value::Object(map) => map,
                _ => unreachable!("entry was just made an object"),
            };
        }

        node.insert(last.to_string(), value);
        Ok(())
    }

    /// Removes the node and prunes parents left empty.
    fn delete_in(node: &mut Map<String, Value>, parts: &[&str]) {
        match parts {
            [] => node.clear(),
            [last] => {
                node.remove(*last);
            }
            [first, rest @ ..] => {
                if let Some(Value::Object(child)) = node.get_mut(*first) {
                    Self::delete_in(child, rest);
                    if child.is_empty() {
                        node.remove(*first);
                    }
                }
            }
        }
    }

    fn lookup<'a>(root: &'a Map<String, Value>, parts: &[&str]) -> Option<&'a Value> {
        let (first, rest) = parts.split_first()?;
        let mut node = root.get(*first)?;
        for part in rest {
            node = node.as_object()?.get(*part)?;
        }
        Some(node)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let parts = segments(path)?;
        let root = self.root.read();

        if parts.is_empty() {
            return Ok((!root.is_empty()).then(|| Value::Object(root.clone())));
        }

        Ok(Self::lookup(&root, &parts).filter(|v| !v.is_null()).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let parts = segments(path)?;
        let mut root = self.root.write();
        Self::set_in(&mut root, &parts, value)
    }

    async fn update(&self, path: &str, patch: Map<String, Value>) -> Result<()> {
        // Validate every key before mutating so a bad key leaves the tree untouched.
        let mut writes = Vec::with_capacity(patch.len());
        for (key, value) in patch {
            let child = join(path, &key);
            segments(&child)?;
            writes.push((child, value));
        }

        let mut root = self.root.write();
        for (child, value) in writes {
            let parts = segments(&child)?;
            Self::set_in(&mut root, &parts, value)?;
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let parts = segments(path)?;
        let mut root = self.root.write();
        Self::delete_in(&mut root, &parts);
        Ok(())
    }

    async fn query_ordered_by_child(
        &self,
        path: &str,
        child_key: &str,
        equals: &Value,
        limit: usize,
    ) -> Result<Vec<(String, Value)>> {
        let parts = segments(path)?;
        let root = self.root.read();

        if parts.is_empty() {
            let node = Value::Object(root.clone());
            return Ok(filter_children(Some(&node), child_key, equals, limit));
        }

        Ok(filter_children(
            Self::lookup(&root, &parts),
            child_key,
            equals,
            limit,
        ))
    }
}
