//! Store writer with bounded exponential backoff.
//!
//! Drains the dispatcher's queue in order. A write that keeps failing is
//! given up after `max_attempts` and the store is reported unhealthy; the
//! in-memory state that produced it is never rolled back.

use resq_core::{CanonicalSample, ClosedSession, EmergencyEvent, QualityScore, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::paths::{self, DeviceSection};
use store::Store;
use telemetry::{health, metrics};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatcher::PersistJob;

/// Retry schedule for store writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.persist_max_attempts,
            base_backoff: Duration::from_millis(config.persist_backoff_base_ms),
            max_backoff: Duration::from_millis(config.persist_backoff_max_ms),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// A single store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Set { path: String, value: Value },
    Update { path: String, patch: Map<String, Value> },
}

impl Write {
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } | Self::Update { path, .. } => path,
        }
    }
}

pub struct PersistenceWorker {
    store: Arc<dyn Store>,
    policy: RetryPolicy,
}

impl PersistenceWorker {
    pub fn new(store: Arc<dyn Store>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Runs until every sender is gone, or until `shutdown` flips, after
    /// which the jobs already queued are drained.
    pub async fn run(self, mut rx: mpsc::Receiver<PersistJob>, mut shutdown: watch::Receiver<bool>) {
        info!("Persistence worker started");

        loop {
            tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => self.handle(job).await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    rx.close();
                    while let Some(job) = rx.recv().await {
                        self.handle(job).await;
                    }
                    break;
                }
            }
        }

        info!("Persistence worker drained");
    }

    /// Handles one job. Failures are logged and counted, never returned.
    pub async fn handle(&self, job: PersistJob) {
        metrics().persist_queue_depth.dec();

        if let PersistJob::Barrier(ack) = job {
            let _ = ack.send(());
            return;
        }

        let writes = match writes_for(&job) {
            Ok(writes) => writes,
            Err(e) => {
                error!(error = %e, "Failed to encode persistence job");
                return;
            }
        };

        for write in writes {
            // Give-ups are already accounted for in write_with_retry.
            let _ = self.write_with_retry(&write).await;
        }
    }

    async fn write_with_retry(&self, write: &Write) -> Result<()> {
        let m = metrics();
        let mut attempt = 1;

        loop {
            let start = Instant::now();
            match self.apply(write).await {
                Ok(()) => {
                    m.persist_writes.inc();
                    m.persist_latency_ms
                        .observe(start.elapsed().as_millis() as u64);
                    health().store.set_healthy();
                    debug!(path = write.path(), attempt, "Store write ok");
                    return Ok(());
                }
                Err(e) if attempt < self.policy.max_attempts && e.is_retryable() => {
                    m.persist_retries.inc();
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        path = write.path(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    m.persist_failures.inc();
                    health()
                        .store
                        .set_unhealthy(format!("write to {} failed: {}", write.path(), e));
                    error!(path = write.path(), attempt, error = %e, "Store write abandoned");
                    return Err(e);
                }
            }
        }
    }

    async fn apply(&self, write: &Write) -> Result<()> {
        match write {
            Write::Set { path, value } => self.store.set(path, value.clone()).await,
            Write::Update { path, patch } => self.store.update(path, patch.clone()).await,
        }
    }
}

/// Store writes for a job.
pub fn writes_for(job: &PersistJob) -> Result<Vec<Write>> {
    let writes = match job {
        PersistJob::Sample { sample, score } => {
            let key = paths::sample_key(sample.timestamp, Uuid::new_v4());
            let mut writes = vec![Write::Set {
                path: paths::sample(&key),
                value: sample_record(&key, sample, score.as_ref())?,
            }];
            // Latest readings only track accepted samples.
            if let Some(score) = score {
                writes.push(Write::Update {
                    path: paths::device(&sample.device_id),
                    patch: device_sections(sample, score),
                });
            }
            writes
        }
        PersistJob::Session(closed) => vec![session_write(closed)],
        PersistJob::Emergency(event) => vec![emergency_write(event)],
        PersistJob::Barrier(_) => Vec::new(),
    };
    Ok(writes)
}

fn sample_record(
    key: &str,
    sample: &CanonicalSample,
    score: Option<&QualityScore>,
) -> Result<Value> {
    let mut record = compact(serde_json::to_value(sample)?);
    if let Value::Object(map) = &mut record {
        map.insert("id".to_string(), json!(key));
        match score {
            Some(score) => {
                map.insert("quality_score".to_string(), json!(score.overall));
            }
            None => {
                map.insert("stale".to_string(), json!(true));
            }
        }
    }
    Ok(record)
}

fn device_sections(sample: &CanonicalSample, score: &QualityScore) -> Map<String, Value> {
    let ts = sample.timestamp;
    let mut patch = Map::new();

    patch.insert(
        DeviceSection::Cpr.as_str().to_string(),
        json!({
            "compression_rate": sample.compression_rate,
            "compression_depth": sample.compression_depth,
            "pressure": sample.pressure,
            "acceleration_x": sample.acceleration_x,
            "acceleration_y": sample.acceleration_y,
            "acceleration_z": sample.acceleration_z,
            "quality_score": score.overall,
            "timestamp": ts,
        }),
    );

    if sample.temperature.is_some() || sample.humidity.is_some() || sample.altitude.is_some() {
        patch.insert(
            DeviceSection::Environment.as_str().to_string(),
            compact(json!({
                "temperature": sample.temperature,
                "humidity": sample.humidity,
                "altitude": sample.altitude,
                "timestamp": ts,
            })),
        );
    }

    patch.insert(
        DeviceSection::Gesture.as_str().to_string(),
        compact(json!({
            "proximity": sample.proximity,
            "gesture": sample.gesture,
            "timestamp": ts,
        })),
    );

    patch.insert(
        DeviceSection::Status.as_str().to_string(),
        compact(json!({
            "sos_triggered": sample.is_sos(),
            "battery_level": sample.battery_level,
            "wifi_signal": sample.wifi_signal,
            "last_update": ts,
        })),
    );

    patch
}

fn session_write(closed: &ClosedSession) -> Write {
    Write::Set {
        path: paths::session(&closed.session_id().to_string()),
        value: closed.to_record(),
    }
}

fn emergency_write(event: &EmergencyEvent) -> Write {
    Write::Set {
        path: paths::emergency(&event.id.to_string()),
        value: compact(event.to_record()),
    }
}

/// Drops null members; a null child would delete it in the store.
fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}
