//! Test helpers shared by the engine's unit tests.

use async_trait::async_trait;
use resq_core::{error::StoreErrorCode, CanonicalSample, Error, Result};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use store::{MemoryStore, Store};

/// A sample with full pressure credit.
pub fn sample_at(timestamp: i64, rate: f64, depth: f64) -> CanonicalSample {
    CanonicalSample {
        device_id: "dev-1".to_string(),
        timestamp,
        compression_rate: rate,
        compression_depth: depth,
        pressure: 2.0,
        acceleration_x: 0.1,
        acceleration_y: 0.2,
        acceleration_z: 9.8,
        proximity: 0.5,
        temperature: None,
        humidity: None,
        altitude: None,
        gesture: None,
        sos_triggered: None,
        battery_level: None,
        wifi_signal: None,
    }
}

/// Overall score 0.1: out-of-band rate, no depth, no pressure.
pub fn low_quality_sample(timestamp: i64) -> CanonicalSample {
    CanonicalSample {
        pressure: 0.0,
        ..sample_at(timestamp, 200.0, 0.0)
    }
}

/// Fails the first `failures` writes, then delegates to memory.
pub struct FlakyStore {
    pub inner: MemoryStore,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(Error::persistence(StoreErrorCode::Unavailable, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.attempt()?;
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &str, patch: Map<String, Value>) -> Result<()> {
        self.attempt()?;
        self.inner.update(path, patch).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.attempt()?;
        self.inner.delete(path).await
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
}
