//! CPR session types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Closed => "closed",
        }
    }

    /// Whether the session still accepts samples.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A sample arrived after the close threshold
    Gap,
    /// The sweep found the device silent past the close threshold
    Timeout,
    /// Explicit close request
    Requested,
    /// Gateway shutdown
    Shutdown,
}

/// Namespace for session IDs.
const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0x6a1e_52c0_9d4b_4f3e_8a7c_2b1d_0e5f_7c91);

/// Deterministic session ID for the `sequence`-th session of a device,
/// starting at `start_time`.
///
/// Equal timestamps are legal, so a session closed on request can be
/// followed by one starting at the same instant; the sequence keeps their
/// IDs apart.
pub fn session_id_for(device_id: &str, sequence: u64, start_time: i64) -> Uuid {
    Uuid::new_v5(
        &SESSION_NAMESPACE,
        format!("{}:{}:{}", device_id, sequence, start_time).as_bytes(),
    )
}

/// Rolling aggregates of one device's CPR session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub device_id: String,
    /// First sample time (ms epoch)
    pub start_time: i64,
    /// Latest accepted sample time (ms epoch)
    pub last_sample_time: i64,
    pub sample_count: u64,
    /// Samples with compression_rate > 0
    pub compression_count: u64,
    pub sum_rate: f64,
    pub sum_depth: f64,
    pub sum_quality: f64,
    pub status: SessionStatus,
}

impl SessionState {
    /// Opens a session at the time of its first sample. The first sample
    /// itself is applied by the caller.
    ///
    /// The ID is derived from device, per-device sequence and start time,
    /// so replaying a device's samples reproduces the same sessions and
    /// re-persisting one overwrites rather than duplicates.
    pub fn open(device_id: impl Into<String>, sequence: u64, start_time: i64) -> Self {
        let device_id = device_id.into();
        Self {
            session_id: session_id_for(&device_id, sequence, start_time),
            device_id,
            start_time,
            last_sample_time: start_time,
            sample_count: 0,
            compression_count: 0,
            sum_rate: 0.0,
            sum_depth: 0.0,
            sum_quality: 0.0,
            status: SessionStatus::Active,
        }
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            sum / self.sample_count as f64
        }
    }

    pub fn average_rate(&self) -> f64 {
        self.mean(self.sum_rate)
    }

    pub fn average_depth(&self) -> f64 {
        self.mean(self.sum_depth)
    }

    pub fn average_quality(&self) -> f64 {
        self.mean(self.sum_quality)
    }

    /// Session duration in ms.
    pub fn duration_ms(&self) -> i64 {
        self.last_sample_time - self.start_time
    }
}

/// A finalized session, immutable and ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedSession {
    pub state: SessionState,
    /// Time the session was closed (ms epoch)
    pub end_time: i64,
    pub average_rate: f64,
    pub average_depth: f64,
    pub quality_score: f64,
    pub reason: CloseReason,
}

impl ClosedSession {
    /// Finalizes averages and marks the session closed.
    pub fn finalize(mut state: SessionState, end_time: i64, reason: CloseReason) -> Self {
        state.status = SessionStatus::Closed;
        Self {
            average_rate: state.average_rate(),
            average_depth: state.average_depth(),
            quality_score: state.average_quality(),
            end_time,
            reason,
            state,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.state.session_id
    }

    pub fn device_id(&self) -> &str {
        &self.state.device_id
    }

    /// Record layout stored under `sessions/{id}`.
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.state.session_id.to_string(),
            "device_id": self.state.device_id,
            "start_time": self.state.start_time,
            "end_time": self.end_time,
            "duration": self.state.duration_ms() / 1000,
            "total_compressions": self.state.compression_count,
            "sample_count": self.state.sample_count,
            "average_rate": self.average_rate,
            "average_depth": self.average_depth,
            "quality_score": self.quality_score,
            "status": "completed",
            "close_reason": self.reason,
        })
    }
}
