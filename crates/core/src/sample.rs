//! Sensor sample types and the field-by-field sample validator.
//!
//! Devices post either a flat object or the sectioned layout the firmware
//! uses:
//!
//! ```json
//! { "cpr": { "compression_rate": 110, ... }, "environment": { ... },
//!   "gesture": { "proximity": 0.2, ... }, "status": { "sos_triggered": false } }
//! ```
//!
//! Each section only supplies the fields it owns, so `environment.pressure`
//! (barometric, hPa) never stands in for the CPR `pressure` reading, and
//! per-section timestamps are ignored. Top-level keys win over section
//! keys; earlier sections win over later ones.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use validator::Validate;

use regex::Regex;

use crate::error::{Error, Result, SampleErrorCode};
use crate::limits::{DEVICE_ID_PATTERN, MAX_BATTERY_LEVEL};

/// Compiled device ID regex (lazy initialization).
static DEVICE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEVICE_ID_PATTERN).expect("invalid device ID pattern"));

/// Sections of the firmware payload and the fields each one owns, in
/// precedence order.
const SECTIONS: [(&str, &[&str]); 4] = [
    (
        "cpr",
        &[
            "compression_rate",
            "compression_depth",
            "pressure",
            "acceleration_x",
            "acceleration_y",
            "acceleration_z",
        ],
    ),
    ("environment", &["temperature", "humidity", "altitude"]),
    ("gesture", &["proximity", "gesture", "gesture_type", "sos_triggered"]),
    ("status", &["sos_triggered", "battery_level", "wifi_signal"]),
];

fn is_section(key: &str) -> bool {
    SECTIONS.iter().any(|(name, _)| *name == key)
}

/// Required numeric fields of every sample.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "compression_rate",
    "compression_depth",
    "pressure",
    "acceleration_x",
    "acceleration_y",
    "acceleration_z",
    "proximity",
];

/// A validated, typed sensor sample.
///
/// Optional readings that the device did not report stay `None` rather
/// than defaulting to zero, so they never bias scoring or aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CanonicalSample {
    pub device_id: String,
    /// Sample time in ms since the epoch
    pub timestamp: i64,
    /// Compressions per minute
    #[validate(range(min = 0.0, exclusive_max = 300.0))]
    pub compression_rate: f64,
    /// Compression depth in cm
    #[validate(range(min = 0.0, max = 15.0))]
    pub compression_depth: f64,
    /// Applied pressure (sensor units, 2.0 = full credit)
    #[validate(range(min = 0.0))]
    pub pressure: f64,
    pub acceleration_x: f64,
    pub acceleration_y: f64,
    pub acceleration_z: f64,
    /// Normalized proximity reading
    #[validate(range(min = 0.0, max = 1.0))]
    pub proximity: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub altitude: Option<f64>,
    pub gesture: Option<i64>,
    pub sos_triggered: Option<bool>,
    #[validate(range(max = 100))]
    pub battery_level: Option<u8>,
    pub wifi_signal: Option<f64>,
}

impl CanonicalSample {
    /// Whether the device raised its SOS flag on this sample.
    pub fn is_sos(&self) -> bool {
        self.sos_triggered.unwrap_or(false)
    }

    /// Whether this sample represents a compression cycle.
    pub fn is_compression(&self) -> bool {
        self.compression_rate > 0.0
    }

    /// Checks finiteness and hard bounds of every numeric field.
    pub fn check_bounds(&self) -> Result<()> {
        let numeric = [
            ("compression_rate", Some(self.compression_rate)),
            ("compression_depth", Some(self.compression_depth)),
            ("pressure", Some(self.pressure)),
            ("acceleration_x", Some(self.acceleration_x)),
            ("acceleration_y", Some(self.acceleration_y)),
            ("acceleration_z", Some(self.acceleration_z)),
            ("proximity", Some(self.proximity)),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("altitude", self.altitude),
            ("wifi_signal", self.wifi_signal),
        ];

        for (field, value) in numeric {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(Error::invalid_sample(
                        SampleErrorCode::NonFinite,
                        field,
                        format!("{} must be finite, got {}", field, v),
                    ));
                }
            }
        }

        self.validate().map_err(|errors| {
            let mut fields: Vec<String> = errors
                .field_errors()
                .keys()
                .map(|k| k.to_string())
                .collect();
            fields.sort();
            let first = fields.first().cloned().unwrap_or_default();
            Error::invalid_sample(
                SampleErrorCode::OutOfRange,
                first,
                format!("out of range: {}", fields.join(", ")),
            )
        })
    }
}

/// Validates a raw device payload into a `CanonicalSample`.
///
/// `arrival_ms` is used as the sample time when the payload carries no
/// `timestamp` of its own.
pub fn validate_sample(device_id: &str, raw: &Value, arrival_ms: i64) -> Result<CanonicalSample> {
    validate_device_id(device_id)?;

    let flat = flatten(raw)?;

    let timestamp = match flat.get("timestamp") {
        None | Some(Value::Null) => arrival_ms,
        Some(v) => v
            .as_i64()
            .filter(|ts| *ts >= 0)
            .ok_or_else(|| {
                Error::invalid_sample(
                    SampleErrorCode::Malformed,
                    "timestamp",
                    "timestamp must be a non-negative integer (ms epoch)",
                )
            })?,
    };

    let gesture = match optional_i64(&flat, "gesture")? {
        Some(g) => Some(g),
        // Firmware also reports a named gesture_type; only numeric codes are kept.
        None => flat.get("gesture_type").and_then(Value::as_i64),
    };

    let battery_level = match optional_f64(&flat, "battery_level")? {
        None => None,
        Some(level) if (0.0..=f64::from(MAX_BATTERY_LEVEL)).contains(&level) => {
            Some(level.round() as u8)
        }
        Some(level) => {
            return Err(Error::invalid_sample(
                SampleErrorCode::OutOfRange,
                "battery_level",
                format!("battery_level {} outside [0, 100]", level),
            ))
        }
    };

    let sample = CanonicalSample {
        device_id: device_id.to_string(),
        timestamp,
        compression_rate: required_f64(&flat, "compression_rate")?,
        compression_depth: required_f64(&flat, "compression_depth")?,
        pressure: required_f64(&flat, "pressure")?,
        acceleration_x: required_f64(&flat, "acceleration_x")?,
        acceleration_y: required_f64(&flat, "acceleration_y")?,
        acceleration_z: required_f64(&flat, "acceleration_z")?,
        proximity: required_f64(&flat, "proximity")?,
        temperature: optional_f64(&flat, "temperature")?,
        humidity: optional_f64(&flat, "humidity")?,
        altitude: optional_f64(&flat, "altitude")?,
        gesture,
        sos_triggered: optional_bool(&flat, "sos_triggered")?,
        battery_level,
        wifi_signal: optional_f64(&flat, "wifi_signal")?,
    };

    sample.check_bounds()?;
    Ok(sample)
}

/// Validates a device ID against `DEVICE_ID_PATTERN`.
pub fn validate_device_id(device_id: &str) -> Result<()> {
    if DEVICE_ID_REGEX.is_match(device_id) {
        Ok(())
    } else {
        Err(Error::invalid_sample(
            SampleErrorCode::Malformed,
            "device_id",
            format!("invalid device_id {:?}", device_id),
        ))
    }
}

fn flatten(raw: &Value) -> Result<Map<String, Value>> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::malformed_sample("sample must be a JSON object"))?;

    let mut flat = Map::new();
    for (key, value) in obj {
        if is_section(key) && value.is_object() {
            continue;
        }
        flat.insert(key.clone(), value.clone());
    }

    for (section, owned) in SECTIONS {
        if let Some(Value::Object(fields)) = obj.get(section) {
            for key in owned {
                if let Some(value) = fields.get(*key) {
                    flat.entry(key.to_string()).or_insert_with(|| value.clone());
                }
            }
        }
    }

    Ok(flat)
}

fn required_f64(flat: &Map<String, Value>, field: &str) -> Result<f64> {
    optional_f64(flat, field)?.ok_or_else(|| {
        Error::invalid_sample(
            SampleErrorCode::MissingField,
            field,
            format!("missing required field: {}", field),
        )
    })
}

fn optional_f64(flat: &Map<String, Value>, field: &str) -> Result<Option<f64>> {
    match flat.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| {
            Error::invalid_sample(
                SampleErrorCode::NonFinite,
                field,
                format!("{} is not representable as a finite number", field),
            )
        }),
        Some(other) => Err(type_error(field, "number", other)),
    }
}

fn optional_i64(flat: &Map<String, Value>, field: &str) -> Result<Option<i64>> {
    match flat.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| type_error(field, "integer", v)),
    }
}

fn optional_bool(flat: &Map<String, Value>, field: &str) -> Result<Option<bool>> {
    match flat.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(type_error(field, "boolean", other)),
    }
}

fn type_error(field: &str, expected: &str, got: &Value) -> Error {
    Error::invalid_sample(
        SampleErrorCode::Malformed,
        field,
        format!("{} must be a {}, got {}", field, expected, got),
    )
}
