//! Fan-out of computed state to storage and live subscribers.
//!
//! Device workers hand results here and move on. Persistence goes through
//! one bounded queue drained by the persistence worker; live updates go to
//! a broadcast channel per device. Neither path ever blocks a worker.

use parking_lot::RwLock;
use resq_core::{
    CanonicalSample, ClosedSession, EmergencyEvent, QualityScore, SessionState, TriggerKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use telemetry::metrics;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::aggregator::Transition;
use crate::config::EngineConfig;
use crate::device::{SampleOutcome, SweepOutcome};

/// One push to a device's subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    pub device_id: String,
    /// Sample time, or sweep time for sweep-driven updates
    pub timestamp: i64,
    /// Score of the sample, absent for sweep-driven updates
    pub score: Option<QualityScore>,
    /// Session snapshot; a closed session is sent once with status `closed`
    pub session: Option<SessionState>,
    pub events: Vec<EmergencyEvent>,
}

/// Work for the persistence worker.
#[derive(Debug)]
pub enum PersistJob {
    /// A sample record; `score` is absent for rejected out-of-order samples
    Sample {
        sample: CanonicalSample,
        score: Option<QualityScore>,
    },
    Session(ClosedSession),
    Emergency(EmergencyEvent),
    /// Acknowledged once every earlier job has been handled
    Barrier(oneshot::Sender<()>),
}

impl PersistJob {
    /// Sessions and emergencies are never dropped for lack of queue space.
    fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Session(_) | Self::Emergency(_) | Self::Barrier(_)
        )
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Sample { .. } => "sample",
            Self::Session(_) => "session",
            Self::Emergency(_) => "emergency",
            Self::Barrier(_) => "barrier",
        }
    }
}

pub struct Dispatcher {
    persist_tx: mpsc::Sender<PersistJob>,
    channels: RwLock<HashMap<String, broadcast::Sender<LiveUpdate>>>,
    subscriber_capacity: usize,
    store_stale_samples: bool,
}

impl Dispatcher {
    /// Creates the dispatcher and the receiving end of its persistence queue.
    pub fn new(config: &EngineConfig) -> (Self, mpsc::Receiver<PersistJob>) {
        let (persist_tx, persist_rx) = mpsc::channel(config.persist_queue_capacity);
        let dispatcher = Self {
            persist_tx,
            channels: RwLock::new(HashMap::new()),
            subscriber_capacity: config.subscriber_capacity,
            store_stale_samples: config.store_stale_samples,
        };
        (dispatcher, persist_rx)
    }

    /// Queues a persistence job without waiting.
    ///
    /// A full queue drops samples; sessions and emergencies are handed to a
    /// background send instead so they still land once the queue drains.
    pub fn persist(&self, job: PersistJob) {
        match self.persist_tx.try_send(job) {
            Ok(()) => metrics().persist_queue_depth.inc(),
            Err(mpsc::error::TrySendError::Full(job)) if job.is_critical() => {
                debug!(kind = job.kind(), "Persistence queue full, deferring");
                let tx = self.persist_tx.clone();
                tokio::spawn(async move {
                    let kind = job.kind();
                    if tx.send(job).await.is_ok() {
                        metrics().persist_queue_depth.inc();
                    } else {
                        metrics().persist_dropped.inc();
                        warn!(kind, "Persistence worker gone, job dropped");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                metrics().persist_dropped.inc();
                warn!(kind = job.kind(), "Persistence queue full, job dropped");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                metrics().persist_dropped.inc();
                warn!(kind = job.kind(), "Persistence worker gone, job dropped");
            }
        }
    }

    /// Waits until every job queued before this call has been handled.
    pub async fn barrier(&self) {
        let (tx, rx) = oneshot::channel();
        if self.persist_tx.send(PersistJob::Barrier(tx)).await.is_ok() {
            metrics().persist_queue_depth.inc();
            let _ = rx.await;
        }
    }

    /// Subscribes to a device's live updates.
    pub fn subscribe(&self, device_id: &str) -> broadcast::Receiver<LiveUpdate> {
        if let Some(tx) = self.channels.read().get(device_id) {
            return tx.subscribe();
        }

        let mut channels = self.channels.write();
        channels
            .entry(device_id.to_string())
            .or_insert_with(|| broadcast::channel(self.subscriber_capacity).0)
            .subscribe()
    }

    /// Pushes an update to current subscribers, if any.
    pub fn publish(&self, update: LiveUpdate) {
        let channels = self.channels.read();
        let Some(tx) = channels.get(&update.device_id) else {
            return;
        };
        if tx.receiver_count() > 0 && tx.send(update).is_ok() {
            metrics().updates_published.inc();
        }
    }

    /// Drops a device's channel once its last subscriber is gone.
    pub fn release(&self, device_id: &str) {
        let mut channels = self.channels.write();
        if channels
            .get(device_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(device_id);
            debug!(device_id, "Live channel released");
        }
    }

    /// Devices with a live channel.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Number of live subscribers for a device.
    pub fn subscriber_count(&self, device_id: &str) -> usize {
        self.channels
            .read()
            .get(device_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Fans out an accepted sample.
    pub fn dispatch_sample(&self, outcome: &SampleOutcome) {
        let m = metrics();
        m.samples_accepted.inc();
        if outcome.sample.is_compression() {
            m.compressions.inc();
        }

        if let Some(closed) = &outcome.closed {
            self.dispatch_closed(closed.clone());
        }
        if matches!(outcome.transition, Transition::Opened | Transition::Rolled) {
            m.sessions_opened.inc();
            m.active_sessions.inc();
            info!(
                device_id = %outcome.session.device_id,
                session_id = %outcome.session.session_id,
                "Session opened"
            );
        }

        self.persist(PersistJob::Sample {
            sample: outcome.sample.clone(),
            score: Some(outcome.score),
        });
        self.dispatch_events(&outcome.events);

        self.publish(LiveUpdate {
            device_id: outcome.session.device_id.clone(),
            timestamp: outcome.sample.timestamp,
            score: Some(outcome.score),
            session: Some(outcome.session.clone()),
            events: outcome.events.clone(),
        });
    }

    /// Fans out a sample rejected as out of order. Only its SOS, if any,
    /// and optionally the raw record go anywhere.
    pub fn dispatch_stale(&self, sample: CanonicalSample, sos: Option<EmergencyEvent>) {
        metrics().samples_stale.inc();

        if let Some(event) = sos {
            let events = vec![event];
            self.dispatch_events(&events);
            self.publish(LiveUpdate {
                device_id: sample.device_id.clone(),
                timestamp: sample.timestamp,
                score: None,
                session: None,
                events,
            });
        }

        if self.store_stale_samples {
            self.persist(PersistJob::Sample {
                sample,
                score: None,
            });
        }
    }

    /// Fans out a sweep result. Quiet sweeps publish nothing.
    pub fn dispatch_sweep(
        &self,
        device_id: &str,
        now: i64,
        outcome: &SweepOutcome,
        session: Option<SessionState>,
    ) {
        if outcome.is_empty() {
            return;
        }

        if let Some(closed) = &outcome.closed {
            self.dispatch_closed(closed.clone());
        }
        self.dispatch_events(&outcome.events);

        let session = session.or_else(|| outcome.closed.as_ref().map(|c| c.state.clone()));
        self.publish(LiveUpdate {
            device_id: device_id.to_string(),
            timestamp: now,
            score: None,
            session,
            events: outcome.events.clone(),
        });
    }

    /// Hands a finalized session to storage.
    pub fn dispatch_closed(&self, closed: ClosedSession) {
        let m = metrics();
        m.sessions_closed.inc();
        m.active_sessions.dec();
        info!(
            device_id = %closed.device_id(),
            session_id = %closed.session_id(),
            reason = ?closed.reason,
            samples = closed.state.sample_count,
            quality = closed.quality_score,
            "Session closed"
        );
        self.persist(PersistJob::Session(closed));
    }

    /// Publishes the final snapshot of a session closed outside the
    /// sample path.
    pub fn publish_closed(&self, closed: &ClosedSession) {
        self.publish(LiveUpdate {
            device_id: closed.device_id().to_string(),
            timestamp: closed.end_time,
            score: None,
            session: Some(closed.state.clone()),
            events: Vec::new(),
        });
    }

    /// Announces an emergency already written by the caller: counted,
    /// logged and pushed to subscribers, but not queued for storage.
    pub fn announce(&self, event: &EmergencyEvent, session: Option<SessionState>) {
        record_event(event);
        self.publish(LiveUpdate {
            device_id: event.device_id.clone(),
            timestamp: event.timestamp,
            score: None,
            session,
            events: vec![event.clone()],
        });
    }

    fn dispatch_events(&self, events: &[EmergencyEvent]) {
        for event in events {
            record_event(event);
            self.persist(PersistJob::Emergency(event.clone()));
        }
    }
}

fn record_event(event: &EmergencyEvent) {
    let m = metrics();
    m.emergencies_emitted.inc();
    match event.trigger_kind {
        TriggerKind::Sos => m.sos_events.inc(),
        TriggerKind::Silence => m.silence_events.inc(),
        TriggerKind::LowQuality => m.low_quality_events.inc(),
        TriggerKind::Manual => m.manual_events.inc(),
    }
    warn!(
        device_id = %event.device_id,
        event_id = %event.id,
        trigger = event.trigger_kind.as_str(),
        "Emergency raised"
    );
}
