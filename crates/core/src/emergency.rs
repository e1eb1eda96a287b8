//! Emergency event types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What raised an emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Device SOS gesture or button
    Sos,
    /// Device stopped reporting mid-session
    Silence,
    /// Sustained poor CPR quality
    LowQuality,
    /// Raised by a responder through the API
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sos => "sos",
            Self::Silence => "silence",
            Self::LowQuality => "low_quality",
            Self::Manual => "manual",
        }
    }
}

/// An emitted emergency. Append-only; downstream dedupes by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub id: Uuid,
    pub device_id: String,
    pub trigger_kind: TriggerKind,
    /// Time of the triggering sample or sweep (ms epoch)
    pub timestamp: i64,
    pub session_id: Option<Uuid>,
}

impl EmergencyEvent {
    pub fn new(
        device_id: impl Into<String>,
        trigger_kind: TriggerKind,
        timestamp: i64,
        session_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            trigger_kind,
            timestamp,
            session_id,
        }
    }

    /// Record layout stored under `emergencies/{id}`.
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id.to_string(),
            "device_id": self.device_id,
            "trigger": self.trigger_kind,
            "timestamp": self.timestamp,
            "session_id": self.session_id.map(|s| s.to_string()),
            "status": "active",
        })
    }
}
