//! Hard bounds for incoming sensor samples.
//!
//! Samples outside these bounds are rejected as `InvalidSample` before
//! they reach the scorer. The `#[validate]` derive on `CanonicalSample`
//! needs literal values, so the ranges are duplicated there. Keep both
//! in sync when modifying.

// === CPR mechanics ===

/// Compression rate upper bound (compressions/min), exclusive.
pub const MAX_COMPRESSION_RATE: f64 = 300.0;

/// Compression depth upper bound (cm), inclusive.
pub const MAX_COMPRESSION_DEPTH_CM: f64 = 15.0;

/// Proximity is a normalized reading in [0, 1].
pub const MAX_PROXIMITY: f64 = 1.0;

// === Device status ===

/// Battery level is a percentage.
pub const MAX_BATTERY_LEVEL: u8 = 100;

// === Identifiers ===

/// Device IDs: alphanumerics, dash and underscore, 1-64 chars.
pub const DEVICE_ID_PATTERN: &str = r"^[A-Za-z0-9_-]{1,64}$";

/// Maximum device ID length.
pub const MAX_DEVICE_ID_LEN: usize = 64;

// === Payload ===

/// Maximum raw sample payload size in bytes (16KB).
pub const MAX_SAMPLE_SIZE_BYTES: usize = 16 * 1024;
