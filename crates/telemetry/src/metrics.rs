//! In-process metrics.
//!
//! Lock-free counters updated on the ingestion path and snapshotted by the
//! scheduler and the `/metrics` endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements, saturating at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Fixed-bucket latency histogram.
#[derive(Debug)]
pub struct Histogram {
    bounds: &'static [u64],
    buckets: Vec<AtomicU64>,
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Bounds for sub-millisecond work, in microseconds.
    pub const MICROS: &'static [u64] = &[10, 50, 100, 250, 500, 1_000, 5_000, 25_000];
    /// Bounds for I/O, in milliseconds.
    pub const MILLIS: &'static [u64] = &[1, 5, 10, 25, 50, 100, 250, 500, 1_000, 5_000];

    pub fn new(bounds: &'static [u64]) -> Self {
        Self {
            bounds,
            buckets: bounds.iter().map(|_| AtomicU64::new(0)).collect(),
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        match self.bounds.iter().position(|&bound| value <= bound) {
            Some(i) => self.buckets[i].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// `(upper_bound, count)` pairs; the overflow bucket reports `u64::MAX`.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        self.bounds
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .chain(std::iter::once((u64::MAX, self.overflow.load(Ordering::Relaxed))))
            .collect()
    }
}

/// Gateway metrics.
#[derive(Debug)]
pub struct Metrics {
    // Ingestion
    pub samples_received: Counter,
    pub samples_accepted: Counter,
    pub samples_invalid: Counter,
    pub samples_stale: Counter,
    pub compressions: Counter,

    // Emergencies
    pub emergencies_emitted: Counter,
    pub sos_events: Counter,
    pub silence_events: Counter,
    pub low_quality_events: Counter,
    pub manual_events: Counter,

    // Sessions
    pub sessions_opened: Counter,
    pub sessions_closed: Counter,
    pub devices_retired: Counter,

    // Persistence
    pub persist_writes: Counter,
    pub persist_retries: Counter,
    pub persist_failures: Counter,
    pub persist_dropped: Counter,

    // Streaming
    pub updates_published: Counter,
    pub updates_lagged: Counter,

    // Gauges
    pub active_sessions: Gauge,
    pub active_devices: Gauge,
    pub live_subscribers: Gauge,
    pub persist_queue_depth: Gauge,

    // Latency
    pub ingest_latency_us: Histogram,
    pub persist_latency_ms: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_received: Counter::new(),
            samples_accepted: Counter::new(),
            samples_invalid: Counter::new(),
            samples_stale: Counter::new(),
            compressions: Counter::new(),
            emergencies_emitted: Counter::new(),
            sos_events: Counter::new(),
            silence_events: Counter::new(),
            low_quality_events: Counter::new(),
            manual_events: Counter::new(),
            sessions_opened: Counter::new(),
            sessions_closed: Counter::new(),
            devices_retired: Counter::new(),
            persist_writes: Counter::new(),
            persist_retries: Counter::new(),
            persist_failures: Counter::new(),
            persist_dropped: Counter::new(),
            updates_published: Counter::new(),
            updates_lagged: Counter::new(),
            active_sessions: Gauge::new(),
            active_devices: Gauge::new(),
            live_subscribers: Gauge::new(),
            persist_queue_depth: Gauge::new(),
            ingest_latency_us: Histogram::new(Histogram::MICROS),
            persist_latency_ms: Histogram::new(Histogram::MILLIS),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub samples_received: u64,
    pub samples_accepted: u64,
    pub samples_invalid: u64,
    pub samples_stale: u64,
    pub compressions: u64,
    pub emergencies_emitted: u64,
    pub sos_events: u64,
    pub silence_events: u64,
    pub low_quality_events: u64,
    pub manual_events: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub devices_retired: u64,
    pub persist_writes: u64,
    pub persist_retries: u64,
    pub persist_failures: u64,
    pub persist_dropped: u64,
    pub updates_published: u64,
    pub updates_lagged: u64,
    pub active_sessions: u64,
    pub active_devices: u64,
    pub live_subscribers: u64,
    pub persist_queue_depth: u64,
    pub ingest_latency_mean_us: f64,
    pub persist_latency_mean_ms: f64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            samples_received: self.samples_received.get(),
            samples_accepted: self.samples_accepted.get(),
            samples_invalid: self.samples_invalid.get(),
            samples_stale: self.samples_stale.get(),
            compressions: self.compressions.get(),
            emergencies_emitted: self.emergencies_emitted.get(),
            sos_events: self.sos_events.get(),
            silence_events: self.silence_events.get(),
            low_quality_events: self.low_quality_events.get(),
            manual_events: self.manual_events.get(),
            sessions_opened: self.sessions_opened.get(),
            sessions_closed: self.sessions_closed.get(),
            devices_retired: self.devices_retired.get(),
            persist_writes: self.persist_writes.get(),
            persist_retries: self.persist_retries.get(),
            persist_failures: self.persist_failures.get(),
            persist_dropped: self.persist_dropped.get(),
            updates_published: self.updates_published.get(),
            updates_lagged: self.updates_lagged.get(),
            active_sessions: self.active_sessions.get(),
            active_devices: self.active_devices.get(),
            live_subscribers: self.live_subscribers.get(),
            persist_queue_depth: self.persist_queue_depth.get(),
            ingest_latency_mean_us: self.ingest_latency_us.mean(),
            persist_latency_mean_ms: self.persist_latency_ms.mean(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
