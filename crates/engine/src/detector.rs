//! Emergency rules.
//!
//! SOS fires on every flagged sample. Silence is evaluated by the sweep
//! and fires once per silent stretch. LowQuality watches a sliding window
//! of overall scores and is debounced per device. Duplicate suppression
//! lives here; the dispatcher forwards whatever is emitted.

use resq_core::{
    CanonicalSample, EmergencyEvent, QualityScore, SessionState, TriggerKind,
};
use std::collections::VecDeque;

use crate::config::EngineConfig;

/// Rule state for one device.
#[derive(Debug, Clone)]
pub struct EmergencyDetector {
    device_id: String,
    silence_threshold: i64,
    window_size: usize,
    low_quality_threshold: f64,
    debounce: i64,
    window: VecDeque<f64>,
    last_low_quality: Option<i64>,
    /// Set once Silence fired; cleared by the next sample
    silence_emitted: bool,
}

impl EmergencyDetector {
    pub fn new(device_id: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            device_id: device_id.into(),
            silence_threshold: config.silence_threshold(),
            window_size: config.low_quality_window,
            low_quality_threshold: config.low_quality_threshold,
            debounce: config.low_quality_debounce(),
            window: VecDeque::with_capacity(config.low_quality_window),
            last_low_quality: None,
            silence_emitted: false,
        }
    }

    /// Evaluates the per-sample rules for an accepted sample.
    pub fn on_sample(
        &mut self,
        sample: &CanonicalSample,
        score: &QualityScore,
        session: Option<&SessionState>,
    ) -> Vec<EmergencyEvent> {
        let session_id = session.map(|s| s.session_id);
        let mut events = Vec::new();

        self.silence_emitted = false;

        if let Some(sos) = self.sos(sample, session) {
            events.push(sos);
        }

        self.window.push_back(score.overall);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        if self.window_is_low() && self.debounce_elapsed(sample.timestamp) {
            self.last_low_quality = Some(sample.timestamp);
            events.push(EmergencyEvent::new(
                &self.device_id,
                TriggerKind::LowQuality,
                sample.timestamp,
                session_id,
            ));
        }

        events
    }

    /// SOS check alone. Used for samples rejected as out of order, which
    /// must not touch the window or the silence flag.
    pub fn sos(
        &self,
        sample: &CanonicalSample,
        session: Option<&SessionState>,
    ) -> Option<EmergencyEvent> {
        sample.is_sos().then(|| {
            EmergencyEvent::new(
                &self.device_id,
                TriggerKind::Sos,
                sample.timestamp,
                session.map(|s| s.session_id),
            )
        })
    }

    /// Silence rule, evaluated by the sweep against the open session.
    pub fn on_sweep(&mut self, now: i64, session: Option<&SessionState>) -> Option<EmergencyEvent> {
        let session = session.filter(|s| s.status.is_open())?;

        if self.silence_emitted || now - session.last_sample_time < self.silence_threshold {
            return None;
        }

        self.silence_emitted = true;
        Some(EmergencyEvent::new(
            &self.device_id,
            TriggerKind::Silence,
            now,
            Some(session.session_id),
        ))
    }

    /// Mean of the current window, if it is full.
    pub fn window_mean(&self) -> Option<f64> {
        if self.window.len() < self.window_size {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }

    fn window_is_low(&self) -> bool {
        self.window_mean()
            .is_some_and(|mean| mean < self.low_quality_threshold)
    }

    fn debounce_elapsed(&self, timestamp: i64) -> bool {
        match self.last_low_quality {
            None => true,
            Some(last) => timestamp - last >= self.debounce,
        }
    }
}
