//! Test fixtures and sample generators.

use serde_json::{json, Value};

/// Token accepted by `StaticVerifier`.
pub const TEST_TOKEN: &str = "test-token";

/// User ID `TEST_TOKEN` resolves to.
pub const TEST_UID: &str = "user-1";

/// Bearer header value for `TEST_TOKEN`.
pub fn bearer() -> String {
    format!("Bearer {}", TEST_TOKEN)
}

/// A flat sample with good mechanics at `timestamp`.
pub fn flat_sample(timestamp: i64) -> Value {
    json!({
        "timestamp": timestamp,
        "compression_rate": 110,
        "compression_depth": 5.5,
        "pressure": 2.0,
        "acceleration_x": 0.1,
        "acceleration_y": -0.2,
        "acceleration_z": 9.8,
        "proximity": 0.4,
        "temperature": 36.5,
        "battery_level": 87
    })
}

/// The same readings in the firmware's sectioned layout.
pub fn sectioned_sample(timestamp: i64) -> Value {
    json!({
        "timestamp": timestamp,
        "cpr": {
            "compression_rate": 110,
            "compression_depth": 5.5,
            "pressure": 2.0,
            "acceleration_x": 0.1,
            "acceleration_y": -0.2,
            "acceleration_z": 9.8
        },
        "environment": { "temperature": 36.5, "humidity": 40, "pressure": 1013.25 },
        "gesture": { "proximity": 0.4, "gesture": 0 },
        "status": { "sos_triggered": false, "battery_level": 87 }
    })
}

/// The firmware's sectioned post with no CPR force reading. The only
/// `pressure` is the barometer in `environment`.
pub fn firmware_sample_without_force(timestamp: i64) -> Value {
    json!({
        "timestamp": timestamp,
        "cpr": {
            "compression_rate": 0,
            "compression_depth": 0,
            "acceleration_x": 0.0,
            "acceleration_y": 0.0,
            "acceleration_z": 9.8
        },
        "environment": {
            "temperature": 24.0,
            "humidity": 55.0,
            "pressure": 1013.25,
            "altitude": 30.0
        },
        "gesture": { "proximity": 0.5, "gesture": 0 }
    })
}

/// A flat sample with the SOS flag raised.
pub fn sos_sample(timestamp: i64) -> Value {
    let mut sample = flat_sample(timestamp);
    sample["sos_triggered"] = json!(true);
    sample
}

/// A flat sample for the legacy endpoint.
pub fn legacy_sample(device_id: &str, timestamp: i64) -> Value {
    let mut sample = flat_sample(timestamp);
    sample["device_id"] = json!(device_id);
    sample
}

/// A sample whose body exceeds the 16KB payload limit.
pub fn oversized_sample(timestamp: i64) -> Value {
    let mut sample = flat_sample(timestamp);
    sample["padding"] = Value::String("x".repeat(20_000));
    sample
}
