//! The engine's public face.
//!
//! Validation and scoring run on the caller's task; the device worker
//! applies the result. Devices never share a lock on the ingest path: the
//! registry lock is only held to look up or insert a handle.

use futures::stream::{self, BoxStream, StreamExt};
use moka::sync::Cache;
use parking_lot::{Mutex, RwLock};
use resq_core::{
    score_sample, validate_device_id, validate_sample, CloseReason, ClosedSession,
    EmergencyEvent, Error, Result, SessionState, TriggerKind,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use store::Store;
use telemetry::metrics;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, LiveUpdate};
use crate::persistence::{PersistenceWorker, RetryPolicy};
use crate::worker::{DeviceHandle, IngestReceipt, RetiredDevices};

/// Totals of one sweep across every device.
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub devices: usize,
    pub went_idle: usize,
    /// Devices whose worker was released after the sweep
    pub retired: usize,
    pub closed: Vec<ClosedSession>,
    pub events: Vec<EmergencyEvent>,
}

pub struct Gateway {
    config: EngineConfig,
    devices: RwLock<HashMap<String, DeviceHandle>>,
    retired: RetiredDevices,
    dispatcher: Arc<Dispatcher>,
    persistence: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    closing: AtomicBool,
}

impl Gateway {
    /// Validates the config and starts the persistence worker.
    pub fn start(config: EngineConfig, store: Arc<dyn Store>) -> Result<Arc<Self>> {
        let config = config.validated()?;
        let (dispatcher, persist_rx) = Dispatcher::new(&config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let retired = Cache::new(config.retired_capacity);
        let worker = PersistenceWorker::new(store, RetryPolicy::from_config(&config));
        let persistence = tokio::spawn(worker.run(persist_rx, shutdown_rx));

        info!(
            idle_ms = config.idle_threshold_ms,
            close_ms = config.close_threshold_ms,
            silence_ms = config.silence_threshold_ms,
            retire_ms = config.retire_after_ms,
            "Gateway started"
        );

        Ok(Arc::new(Self {
            config,
            devices: RwLock::new(HashMap::new()),
            retired,
            dispatcher: Arc::new(dispatcher),
            persistence: Mutex::new(Some(persistence)),
            shutdown_tx,
            closing: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingests a raw sample that arrived now.
    pub async fn ingest(&self, device_id: &str, raw: &Value) -> Result<IngestReceipt> {
        self.ingest_at(device_id, raw, now_ms()).await
    }

    /// Ingests a raw sample with an explicit arrival time, used when the
    /// payload carries no timestamp.
    pub async fn ingest_at(
        &self,
        device_id: &str,
        raw: &Value,
        arrival_ms: i64,
    ) -> Result<IngestReceipt> {
        let start = Instant::now();
        let m = metrics();
        m.samples_received.inc();

        if self.closing.load(Ordering::Acquire) {
            return Err(Error::device_unavailable(device_id));
        }

        let sample = validate_sample(device_id, raw, arrival_ms).inspect_err(|e| {
            m.samples_invalid.inc();
            warn!(device_id, error = %e, "Invalid sample");
        })?;
        let score = score_sample(&sample);

        let handle = self.handle_for(device_id);
        let result = match handle.ingest(sample.clone(), score).await {
            // Worker died; replace it once and retry.
            Err(Error::DeviceUnavailable(_)) if !self.closing.load(Ordering::Acquire) => {
                warn!(device_id, "Device worker unavailable, respawning");
                self.evict(device_id, &handle);
                self.handle_for(device_id).ingest(sample, score).await
            }
            other => other,
        };

        m.ingest_latency_us
            .observe(start.elapsed().as_micros() as u64);
        result
    }

    /// The device's open session, from its latest snapshot.
    pub fn current_session(&self, device_id: &str) -> Option<SessionState> {
        self.devices.read().get(device_id).and_then(|h| h.session())
    }

    /// Live updates for a device. The stream never ends on its own; drop it
    /// to unsubscribe. A subscriber that falls behind skips what it missed.
    pub fn subscribe(&self, device_id: &str) -> Result<BoxStream<'static, LiveUpdate>> {
        validate_device_id(device_id)?;
        let subscription = Subscription {
            rx: self.dispatcher.subscribe(device_id),
            guard: SubscriberGuard::new(device_id, self.dispatcher.clone()),
        };

        Ok(stream::unfold(subscription, |mut sub| async move {
            loop {
                match sub.rx.recv().await {
                    Ok(update) => return Some((update, sub)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        metrics().updates_lagged.inc_by(skipped);
                        warn!(device_id = %sub.guard.device_id, skipped, "Subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }

    /// A responder-raised emergency for the device at `now`, tied to its
    /// open session if it has one. Nothing is stored or sent until the
    /// caller hands it to [`Gateway::announce`].
    pub fn manual_event(&self, device_id: &str, now: i64) -> Result<EmergencyEvent> {
        validate_device_id(device_id)?;
        let session_id = self.current_session(device_id).map(|s| s.session_id);
        Ok(EmergencyEvent::new(device_id, TriggerKind::Manual, now, session_id))
    }

    /// Counts an emergency the caller has already stored and pushes it to
    /// the device's subscribers.
    pub fn announce(&self, event: &EmergencyEvent) {
        self.dispatcher
            .announce(event, self.current_session(&event.device_id));
    }

    /// Closes the device's session on request.
    pub async fn close_session(&self, device_id: &str) -> Result<Option<ClosedSession>> {
        self.close_session_at(device_id, now_ms()).await
    }

    pub async fn close_session_at(&self, device_id: &str, now: i64) -> Result<Option<ClosedSession>> {
        validate_device_id(device_id)?;
        let handle = self.devices.read().get(device_id).cloned();
        match handle {
            Some(handle) => match handle.close(now, CloseReason::Requested).await {
                // Retired in the meantime, so nothing was open.
                Err(Error::DeviceUnavailable(_)) => {
                    self.evict(device_id, &handle);
                    Ok(None)
                }
                other => other,
            },
            None => Ok(None),
        }
    }

    /// Runs the silence, idle and close checks on every device at `now`,
    /// then releases the workers of devices with nothing open that have
    /// been quiet for `retire_after_ms`.
    ///
    /// Handles are copied out first so no registry lock is held while
    /// devices answer; devices answer concurrently.
    pub async fn sweep(&self, now: i64) -> SweepSummary {
        let handles: Vec<DeviceHandle> = self.devices.read().values().cloned().collect();
        let outcomes = futures::future::join_all(handles.iter().map(|h| h.sweep(now))).await;

        let mut summary = SweepSummary {
            devices: handles.len(),
            ..Default::default()
        };
        for (handle, outcome) in handles.iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => {
                    summary.went_idle += usize::from(outcome.went_idle);
                    summary.events.extend(outcome.events);
                    summary.closed.extend(outcome.closed);
                }
                Err(e) => {
                    warn!(device_id = handle.device_id(), error = %e, "Sweep skipped device");
                    self.evict(handle.device_id(), handle);
                }
            }
        }

        let idle: Vec<&DeviceHandle> = handles
            .iter()
            .filter(|h| !h.is_closed() && h.session().is_none())
            .collect();
        let grace = self.config.retire_after();
        let retired = futures::future::join_all(idle.iter().map(|h| h.retire(now, grace))).await;
        for (handle, retired) in idle.into_iter().zip(retired) {
            if matches!(retired, Ok(true)) {
                self.evict(handle.device_id(), handle);
                summary.retired += 1;
            }
        }
        if summary.retired > 0 {
            debug!(retired = summary.retired, "Idle device workers released");
        }

        summary
    }

    /// Waits until everything dispatched so far has been persisted.
    pub async fn flush(&self) {
        self.dispatcher.barrier().await;
    }

    /// Closes every open session, then drains persistence. Further
    /// ingestion is refused.
    pub async fn shutdown(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        let handles: Vec<DeviceHandle> = self.devices.write().drain().map(|(_, h)| h).collect();
        let now = now_ms();
        let closed = futures::future::join_all(
            handles
                .iter()
                .map(|h| h.close(now, CloseReason::Shutdown)),
        )
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Some(_))))
        .count();
        drop(handles);

        info!(devices_closed = closed, "Sessions flushed, draining persistence");

        let _ = self.shutdown_tx.send(true);
        let persistence = self.persistence.lock().take();
        if let Some(handle) = persistence {
            if let Err(e) = handle.await {
                warn!(error = %e, "Persistence worker ended abnormally");
            }
        }

        info!("Gateway stopped");
    }

    /// Number of devices with a live worker.
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    /// Devices with an open session.
    pub fn open_session_count(&self) -> usize {
        self.devices
            .read()
            .values()
            .filter(|h| h.session().is_some())
            .count()
    }

    /// Live subscribers of a device.
    pub fn subscriber_count(&self, device_id: &str) -> usize {
        self.dispatcher.subscriber_count(device_id)
    }

    /// Devices with at least one live subscriber.
    pub fn channel_count(&self) -> usize {
        self.dispatcher.channel_count()
    }

    fn handle_for(&self, device_id: &str) -> DeviceHandle {
        if let Some(handle) = self.devices.read().get(device_id) {
            return handle.clone();
        }

        let mut devices = self.devices.write();
        devices
            .entry(device_id.to_string())
            .or_insert_with(|| {
                info!(device_id, "Starting device worker");
                DeviceHandle::spawn(
                    device_id,
                    &self.config,
                    self.dispatcher.clone(),
                    self.retired.clone(),
                )
            })
            .clone()
    }

    /// Removes a stopped worker's handle unless it was already replaced.
    fn evict(&self, device_id: &str, dead: &DeviceHandle) {
        let mut devices = self.devices.write();
        if devices.get(device_id).is_some_and(|h| h.same_worker(dead)) {
            devices.remove(device_id);
        }
    }
}

/// State of one subscription stream. Fields drop in order, so the
/// receiver is gone by the time the guard releases the channel.
struct Subscription {
    rx: broadcast::Receiver<LiveUpdate>,
    guard: SubscriberGuard,
}

/// Keeps the subscriber gauge honest for the life of a stream and drops
/// the device's channel with its last subscriber.
struct SubscriberGuard {
    device_id: String,
    dispatcher: Arc<Dispatcher>,
}

impl SubscriberGuard {
    fn new(device_id: &str, dispatcher: Arc<Dispatcher>) -> Self {
        metrics().live_subscribers.inc();
        Self {
            device_id: device_id.to_string(),
            dispatcher,
        }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        metrics().live_subscribers.dec();
        self.dispatcher.release(&self.device_id);
    }
}

/// Wall clock in ms since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
