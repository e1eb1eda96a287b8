//! Store path layout.

use uuid::Uuid;

/// Root nodes of the realtime tree.
pub mod node {
    pub const SENSOR_DATA: &str = "sensor_data";
    pub const DEVICES: &str = "devices";
    pub const SESSIONS: &str = "sessions";
    pub const EMERGENCIES: &str = "emergencies";
    pub const USERS: &str = "users";

    /// All root nodes.
    pub const ALL: &[&str] = &[SENSOR_DATA, DEVICES, SESSIONS, EMERGENCIES, USERS];
}

/// Per-device sections holding the latest reading of each sensor group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSection {
    Cpr,
    Environment,
    Gesture,
    Status,
}

impl DeviceSection {
    pub const ALL: [DeviceSection; 4] = [Self::Cpr, Self::Environment, Self::Gesture, Self::Status];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpr => "cpr",
            Self::Environment => "environment",
            Self::Gesture => "gesture",
            Self::Status => "status",
        }
    }
}

/// Key for a stored sample.
///
/// Zero-padded time first so key order is arrival order, which is what
/// `limitToLast` queries rely on.
pub fn sample_key(timestamp: i64, id: Uuid) -> String {
    format!("{:013}_{}", timestamp.max(0), id.simple())
}

pub fn sample(key: &str) -> String {
    format!("{}/{}", node::SENSOR_DATA, key)
}

pub fn device(device_id: &str) -> String {
    format!("{}/{}", node::DEVICES, device_id)
}

pub fn device_section(device_id: &str, section: DeviceSection) -> String {
    format!("{}/{}/{}", node::DEVICES, device_id, section.as_str())
}

pub fn session(session_id: &str) -> String {
    format!("{}/{}", node::SESSIONS, session_id)
}

pub fn emergency(event_id: &str) -> String {
    format!("{}/{}", node::EMERGENCIES, event_id)
}

pub fn user(uid: &str) -> String {
    format!("{}/{}", node::USERS, uid)
}
