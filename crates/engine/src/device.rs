//! Combined state of one device: its session and its emergency rules.
//!
//! Synchronous and owned by exactly one worker; nothing here does I/O.

use resq_core::{
    CanonicalSample, CloseReason, ClosedSession, EmergencyEvent, QualityScore, Result,
    SessionState,
};

use crate::aggregator::{Carryover, SessionAggregator, Transition};
use crate::config::EngineConfig;
use crate::detector::EmergencyDetector;

/// Outcome of an accepted sample.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub sample: CanonicalSample,
    pub score: QualityScore,
    pub transition: Transition,
    /// Session after the sample was applied
    pub session: SessionState,
    /// Previous session, when this sample's gap closed it
    pub closed: Option<ClosedSession>,
    pub events: Vec<EmergencyEvent>,
}

/// Outcome of one sweep pass over a device.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub events: Vec<EmergencyEvent>,
    pub went_idle: bool,
    pub closed: Option<ClosedSession>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && !self.went_idle && self.closed.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceState {
    aggregator: SessionAggregator,
    detector: EmergencyDetector,
}

impl DeviceState {
    pub fn new(device_id: &str, config: &EngineConfig) -> Self {
        Self::resume(device_id, config, Carryover::default())
    }

    /// Fresh detector, but the ordering watermark and session sequence
    /// carry over from a released device.
    pub fn resume(device_id: &str, config: &EngineConfig, carry: Carryover) -> Self {
        Self {
            aggregator: SessionAggregator::resume(device_id, config, carry),
            detector: EmergencyDetector::new(device_id, config),
        }
    }

    pub fn carryover(&self) -> Carryover {
        self.aggregator.carryover()
    }

    /// Whether the device can be dropped from memory at `now`: nothing is
    /// open and no sample arrived within `grace`.
    pub fn can_release(&self, now: i64, grace: i64) -> bool {
        self.aggregator.session().is_none()
            && self
                .aggregator
                .carryover()
                .watermark
                .map_or(true, |last| now - last >= grace)
    }

    pub fn device_id(&self) -> &str {
        self.aggregator.device_id()
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.aggregator.session()
    }

    /// Applies a scored sample. A stale sample fails without touching
    /// either the session or the detector.
    pub fn ingest(&mut self, sample: CanonicalSample, score: QualityScore) -> Result<SampleOutcome> {
        let applied = self.aggregator.apply(&sample, &score)?;

        let session = self
            .aggregator
            .session()
            .cloned()
            .unwrap_or_else(|| {
                let sequence = self.aggregator.carryover().sessions_opened;
                SessionState::open(self.aggregator.device_id(), sequence, sample.timestamp)
            });

        let events = self.detector.on_sample(&sample, &score, Some(&session));

        Ok(SampleOutcome {
            sample,
            score,
            transition: applied.transition,
            session,
            closed: applied.closed,
            events,
        })
    }

    /// SOS for a sample that was rejected as stale.
    pub fn stale_sos(&self, sample: &CanonicalSample) -> Option<EmergencyEvent> {
        self.detector.sos(sample, self.aggregator.session())
    }

    /// Silence, idle and close checks at wall time `now`, in that order.
    pub fn sweep(&mut self, now: i64) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        if let Some(event) = self.detector.on_sweep(now, self.aggregator.session()) {
            outcome.events.push(event);
        }
        outcome.went_idle = self.aggregator.mark_idle(now);
        outcome.closed = self.aggregator.expire(now);

        outcome
    }

    pub fn close(&mut self, now: i64, reason: CloseReason) -> Option<ClosedSession> {
        self.aggregator.close(now, reason)
    }
}
