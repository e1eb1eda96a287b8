//! Per-device session state machine.
//!
//! ```text
//! NoSession --sample--> Active --gap >= idle--> Idle --sample--> Active
//!                         \                       /
//!                          `--gap >= close / close request--> Closed
//! ```
//!
//! Gaps are measured in sample time. A sample older than the device's
//! latest accepted sample is rejected before anything is touched.

use resq_core::{
    CanonicalSample, CloseReason, ClosedSession, Error, QualityScore, Result, SessionState,
    SessionStatus,
};

use crate::config::EngineConfig;

/// How an accepted sample moved the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First sample of a new session
    Opened,
    /// Gap below the idle threshold
    Continued,
    /// Gap between the idle and close thresholds
    WentIdle,
    /// First sample after an idle period found by the sweep
    Resumed,
    /// Gap at or past the close threshold; the previous session closed
    Rolled,
}

/// Result of applying one sample.
#[derive(Debug, Clone)]
pub struct Applied {
    pub transition: Transition,
    /// Session closed by this sample's gap
    pub closed: Option<ClosedSession>,
}

/// What outlives a device's in-memory state once it is released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Carryover {
    /// Latest accepted sample time
    pub watermark: Option<i64>,
    /// Sessions opened so far, the sequence of the next one
    pub sessions_opened: u64,
}

/// Owns the live session of one device.
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    device_id: String,
    idle_threshold: i64,
    close_threshold: i64,
    session: Option<SessionState>,
    /// Latest accepted sample time, kept across sessions
    watermark: Option<i64>,
    sessions_opened: u64,
}

impl SessionAggregator {
    pub fn new(device_id: impl Into<String>, config: &EngineConfig) -> Self {
        Self::resume(device_id, config, Carryover::default())
    }

    /// Picks a device back up from a previously released state.
    pub fn resume(device_id: impl Into<String>, config: &EngineConfig, carry: Carryover) -> Self {
        Self {
            device_id: device_id.into(),
            idle_threshold: config.idle_threshold(),
            close_threshold: config.close_threshold(),
            session: None,
            watermark: carry.watermark,
            sessions_opened: carry.sessions_opened,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn carryover(&self) -> Carryover {
        Carryover {
            watermark: self.watermark,
            sessions_opened: self.sessions_opened,
        }
    }

    /// The open session, if any.
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Applies a validated, scored sample.
    pub fn apply(&mut self, sample: &CanonicalSample, score: &QualityScore) -> Result<Applied> {
        if let Some(last) = self.watermark {
            if sample.timestamp < last {
                return Err(Error::stale(&self.device_id, sample.timestamp, last));
            }
        }

        let mut closed = None;
        let sequence = self.sessions_opened;
        let transition = match self.session.as_mut() {
            None => {
                self.session = Some(SessionState::open(&self.device_id, sequence, sample.timestamp));
                self.sessions_opened += 1;
                Transition::Opened
            }
            Some(session) => {
                let gap = sample.timestamp - session.last_sample_time;
                if gap >= self.close_threshold {
                    let previous = std::mem::replace(
                        session,
                        SessionState::open(&self.device_id, sequence, sample.timestamp),
                    );
                    self.sessions_opened += 1;
                    let end_time = previous.last_sample_time;
                    closed = Some(ClosedSession::finalize(previous, end_time, CloseReason::Gap));
                    Transition::Rolled
                } else if gap >= self.idle_threshold {
                    session.status = SessionStatus::Idle;
                    Transition::WentIdle
                } else if session.status == SessionStatus::Idle {
                    session.status = SessionStatus::Active;
                    Transition::Resumed
                } else {
                    Transition::Continued
                }
            }
        };

        if let Some(session) = self.session.as_mut() {
            accumulate(session, sample, score);
        }
        self.watermark = Some(sample.timestamp);

        Ok(Applied { transition, closed })
    }

    /// Moves an Active session to Idle once `now` is past the idle
    /// threshold. Returns whether the status changed.
    pub fn mark_idle(&mut self, now: i64) -> bool {
        match self.session.as_mut() {
            Some(session)
                if session.status == SessionStatus::Active
                    && now - session.last_sample_time >= self.idle_threshold =>
            {
                session.status = SessionStatus::Idle;
                true
            }
            _ => false,
        }
    }

    /// Closes the session once `now` is past the close threshold.
    pub fn expire(&mut self, now: i64) -> Option<ClosedSession> {
        let expired = self
            .session
            .as_ref()
            .is_some_and(|s| now - s.last_sample_time >= self.close_threshold);

        if !expired {
            return None;
        }

        let state = self.session.take()?;
        let end_time = state.last_sample_time;
        Some(ClosedSession::finalize(state, end_time, CloseReason::Timeout))
    }

    /// Closes the session on request. Returns `None` when there is
    /// nothing open, so a session is only ever finalized once.
    pub fn close(&mut self, now: i64, reason: CloseReason) -> Option<ClosedSession> {
        let state = self.session.take()?;
        let end_time = now.max(state.last_sample_time);
        Some(ClosedSession::finalize(state, end_time, reason))
    }
}

fn accumulate(session: &mut SessionState, sample: &CanonicalSample, score: &QualityScore) {
    session.sample_count += 1;
    if sample.is_compression() {
        session.compression_count += 1;
    }
    session.sum_rate += sample.compression_rate;
    session.sum_depth += sample.compression_depth;
    session.sum_quality += score.overall;
    session.last_sample_time = sample.timestamp;
}
