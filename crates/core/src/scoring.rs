//! CPR quality scoring.
//!
//! Bands follow the clinical targets the device firmware is calibrated
//! against: 100-120 compressions/min and 5-6 cm depth. All intervals are
//! closed. These thresholds are a contract with dashboards and must not be
//! tuned.

use serde::{Deserialize, Serialize};

use crate::sample::CanonicalSample;

/// Target rate band (compressions/min).
pub const TARGET_RATE: (f64, f64) = (100.0, 120.0);
/// Acceptable rate band (compressions/min).
pub const ACCEPTABLE_RATE: (f64, f64) = (80.0, 140.0);
/// Target depth band (cm).
pub const TARGET_DEPTH: (f64, f64) = (5.0, 6.0);
/// Acceptable depth band (cm).
pub const ACCEPTABLE_DEPTH: (f64, f64) = (4.0, 7.0);
/// Pressure that earns full pressure credit.
pub const FULL_PRESSURE: f64 = 2.0;

const TARGET_SCORE: f64 = 1.0;
const ACCEPTABLE_SCORE: f64 = 0.7;
const ACTIVE_SCORE: f64 = 0.3;

/// Quality of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Timestamp of the scored sample
    pub sample_ref: i64,
    pub rate_score: f64,
    pub depth_score: f64,
    pub pressure_score: f64,
    /// Mean of the three sub-scores, in [0, 1]
    pub overall: f64,
}

fn within(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

fn banded(value: f64, target: (f64, f64), acceptable: (f64, f64)) -> f64 {
    if value <= 0.0 {
        0.0
    } else if within(value, target) {
        TARGET_SCORE
    } else if within(value, acceptable) {
        ACCEPTABLE_SCORE
    } else {
        ACTIVE_SCORE
    }
}

/// Rate sub-score.
pub fn rate_score(rate: f64) -> f64 {
    banded(rate, TARGET_RATE, ACCEPTABLE_RATE)
}

/// Depth sub-score.
pub fn depth_score(depth: f64) -> f64 {
    banded(depth, TARGET_DEPTH, ACCEPTABLE_DEPTH)
}

/// Pressure sub-score. Negative pressure earns nothing.
pub fn pressure_score(pressure: f64) -> f64 {
    (pressure.max(0.0) / FULL_PRESSURE).min(1.0)
}

/// Scores raw CPR mechanics.
pub fn score(rate: f64, depth: f64, pressure: f64, sample_ref: i64) -> QualityScore {
    let rate_score = rate_score(rate);
    let depth_score = depth_score(depth);
    let pressure_score = pressure_score(pressure);
    let overall = ((rate_score + depth_score + pressure_score) / 3.0).clamp(0.0, 1.0);

    QualityScore {
        sample_ref,
        rate_score,
        depth_score,
        pressure_score,
        overall,
    }
}

/// Scores a validated sample.
pub fn score_sample(sample: &CanonicalSample) -> QualityScore {
    score(
        sample.compression_rate,
        sample.compression_depth,
        sample.pressure,
        sample.timestamp,
    )
}
