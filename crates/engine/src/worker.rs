//! Per-device actor.
//!
//! Each device gets one task that owns its `DeviceState` and applies
//! commands strictly in arrival order. Readers never touch that state;
//! they read the snapshot the worker publishes after every command.

use moka::sync::Cache;
use parking_lot::RwLock;
use resq_core::{
    CanonicalSample, CloseReason, ClosedSession, EmergencyEvent, Error, QualityScore, Result,
    SessionState,
};
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, Instrument};

use crate::aggregator::Carryover;
use crate::config::EngineConfig;
use crate::device::{DeviceState, SweepOutcome};
use crate::dispatcher::Dispatcher;
use crate::gateway::now_ms;

/// What `ingest` reports.
///
/// An out-of-order sample is only reported here, with `accepted: false`,
/// when it still raised an SOS; otherwise it fails with `StaleSample`.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub accepted: bool,
    /// Absent when the sample was not accepted
    pub score: Option<QualityScore>,
    /// Open session after the sample
    pub session: Option<SessionState>,
    pub events: Vec<EmergencyEvent>,
}

/// Watermarks of devices whose workers were released, shared by the
/// gateway and its workers. Bounded; the least recently used entries go
/// first.
pub type RetiredDevices = Cache<String, Carryover>;

pub enum DeviceCommand {
    Ingest {
        sample: CanonicalSample,
        score: QualityScore,
        reply: oneshot::Sender<Result<IngestReceipt>>,
    },
    Sweep {
        now: i64,
        reply: oneshot::Sender<SweepOutcome>,
    },
    Close {
        now: i64,
        reason: CloseReason,
        reply: oneshot::Sender<Option<ClosedSession>>,
    },
    /// Stops the worker if nothing is open and it has been quiet for `grace`
    Retire {
        now: i64,
        grace: i64,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle to a running device worker.
#[derive(Clone)]
pub struct DeviceHandle {
    device_id: Arc<str>,
    tx: mpsc::Sender<DeviceCommand>,
    snapshot: Arc<RwLock<Option<SessionState>>>,
}

impl DeviceHandle {
    /// Spawns the worker task for `device_id`, picking up whatever a
    /// previously retired worker of the same device left in `retired`.
    pub fn spawn(
        device_id: &str,
        config: &EngineConfig,
        dispatcher: Arc<Dispatcher>,
        retired: RetiredDevices,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.device_queue_capacity);
        let snapshot = Arc::new(RwLock::new(None));
        let carry = retired.remove(device_id).unwrap_or_default();

        let worker = DeviceWorker {
            state: DeviceState::resume(device_id, config, carry),
            dispatcher,
            snapshot: snapshot.clone(),
            retired,
        };

        let span = tracing::info_span!("device", device_id = %device_id);
        tokio::spawn(worker.run(rx).instrument(span));
        metrics().active_devices.inc();

        Self {
            device_id: Arc::from(device_id),
            tx,
            snapshot,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Latest session snapshot published by the worker.
    pub fn session(&self) -> Option<SessionState> {
        self.snapshot.read().clone()
    }

    /// Whether the worker task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles address the same worker.
    pub fn same_worker(&self, other: &DeviceHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    pub async fn ingest(&self, sample: CanonicalSample, score: QualityScore) -> Result<IngestReceipt> {
        let (reply, rx) = oneshot::channel();
        self.request(DeviceCommand::Ingest { sample, score, reply }, rx)
            .await?
    }

    pub async fn sweep(&self, now: i64) -> Result<SweepOutcome> {
        let (reply, rx) = oneshot::channel();
        self.request(DeviceCommand::Sweep { now, reply }, rx).await
    }

    pub async fn close(&self, now: i64, reason: CloseReason) -> Result<Option<ClosedSession>> {
        let (reply, rx) = oneshot::channel();
        self.request(DeviceCommand::Close { now, reason, reply }, rx)
            .await
    }

    /// Asks the worker to stop if it is idle. Returns whether it did.
    pub async fn retire(&self, now: i64, grace: i64) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.request(DeviceCommand::Retire { now, grace, reply }, rx)
            .await
    }

    async fn request<T>(&self, command: DeviceCommand, rx: oneshot::Receiver<T>) -> Result<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::device_unavailable(self.device_id.as_ref()))?;
        rx.await
            .map_err(|_| Error::device_unavailable(self.device_id.as_ref()))
    }
}

struct DeviceWorker {
    state: DeviceState,
    dispatcher: Arc<Dispatcher>,
    snapshot: Arc<RwLock<Option<SessionState>>>,
    retired: RetiredDevices,
}

impl DeviceWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<DeviceCommand>) {
        debug!("Device worker started");

        while let Some(command) = rx.recv().await {
            // Snapshot goes out before the reply so callers read their own write.
            match command {
                DeviceCommand::Ingest { sample, score, reply } => {
                    let result = self.ingest(sample, score);
                    self.publish_snapshot();
                    let _ = reply.send(result);
                }
                DeviceCommand::Sweep { now, reply } => {
                    let outcome = self.sweep(now);
                    self.publish_snapshot();
                    let _ = reply.send(outcome);
                }
                DeviceCommand::Close { now, reason, reply } => {
                    let closed = self.close(now, reason);
                    self.publish_snapshot();
                    let _ = reply.send(closed);
                }
                DeviceCommand::Retire { now, grace, reply } => {
                    if !self.state.can_release(now, grace) {
                        let _ = reply.send(false);
                        continue;
                    }
                    // Recorded before the queue drops, so a respawn racing
                    // this one still sees the watermark. Anything still
                    // queued fails with DeviceUnavailable and is retried.
                    self.retired
                        .insert(self.state.device_id().to_string(), self.state.carryover());
                    let _ = reply.send(true);
                    metrics().devices_retired.inc();
                    info!("Device worker retired");
                    break;
                }
            }
        }

        // Handles are gone or the worker retired; flush what is still open.
        self.close(now_ms(), CloseReason::Shutdown);
        metrics().active_devices.dec();
        debug!("Device worker stopped");
    }

    fn ingest(&mut self, sample: CanonicalSample, score: QualityScore) -> Result<IngestReceipt> {
        match self.state.ingest(sample.clone(), score) {
            Ok(outcome) => {
                self.dispatcher.dispatch_sample(&outcome);
                Ok(IngestReceipt {
                    accepted: true,
                    score: Some(outcome.score),
                    session: Some(outcome.session),
                    events: outcome.events,
                })
            }
            Err(e @ Error::StaleSample { .. }) => {
                debug!(timestamp = sample.timestamp, error = %e, "Stale sample rejected");
                let sos = self.state.stale_sos(&sample);
                self.dispatcher.dispatch_stale(sample, sos.clone());
                match sos {
                    Some(event) => Ok(IngestReceipt {
                        accepted: false,
                        score: None,
                        session: self.state.session().cloned(),
                        events: vec![event],
                    }),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn sweep(&mut self, now: i64) -> SweepOutcome {
        let outcome = self.state.sweep(now);
        if !outcome.is_empty() {
            self.dispatcher.dispatch_sweep(
                self.state.device_id(),
                now,
                &outcome,
                self.state.session().cloned(),
            );
        }
        outcome
    }

    fn close(&mut self, now: i64, reason: CloseReason) -> Option<ClosedSession> {
        let closed = self.state.close(now, reason)?;
        info!(reason = ?reason, "Closing session");
        self.dispatcher.dispatch_closed(closed.clone());
        self.dispatcher.publish_closed(&closed);
        Some(closed)
    }

    fn publish_snapshot(&self) {
        *self.snapshot.write() = self.state.session().cloned();
    }
}
