//! Engine configuration.

use resq_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Thresholds and capacities of the aggregation engine.
///
/// All durations are in milliseconds of sample time.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_thresholds"))]
pub struct EngineConfig {
    /// Gap after which a session goes idle
    #[serde(default = "default_idle_threshold_ms")]
    #[validate(range(min = 1))]
    pub idle_threshold_ms: u64,

    /// Gap after which a session closes
    #[serde(default = "default_close_threshold_ms")]
    #[validate(range(min = 1))]
    pub close_threshold_ms: u64,

    /// Silence before a Silence emergency is raised
    #[serde(default = "default_silence_threshold_ms")]
    #[validate(range(min = 1))]
    pub silence_threshold_ms: u64,

    /// Number of quality scores in the low-quality window
    #[serde(default = "default_low_quality_window")]
    #[validate(range(min = 1, max = 10_000))]
    pub low_quality_window: usize,

    /// Window mean below which quality is considered low
    #[serde(default = "default_low_quality_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub low_quality_threshold: f64,

    /// Minimum spacing of LowQuality events per device
    #[serde(default = "default_low_quality_debounce_ms")]
    pub low_quality_debounce_ms: u64,

    /// Sweep timer period (wall clock)
    #[serde(default = "default_sweep_interval_ms")]
    #[validate(range(min = 10))]
    pub sweep_interval_ms: u64,

    /// Pending commands per device worker
    #[serde(default = "default_device_queue_capacity")]
    #[validate(range(min = 1))]
    pub device_queue_capacity: usize,

    /// Buffered live updates per device before slow subscribers lag
    #[serde(default = "default_subscriber_capacity")]
    #[validate(range(min = 1))]
    pub subscriber_capacity: usize,

    /// Pending persistence jobs before samples are dropped
    #[serde(default = "default_persist_queue_capacity")]
    #[validate(range(min = 1))]
    pub persist_queue_capacity: usize,

    #[serde(default = "default_persist_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub persist_max_attempts: u32,

    #[serde(default = "default_persist_backoff_base_ms")]
    pub persist_backoff_base_ms: u64,

    #[serde(default = "default_persist_backoff_max_ms")]
    pub persist_backoff_max_ms: u64,

    /// Quiet time after the last sample before a device with no open
    /// session gives up its worker
    #[serde(default = "default_retire_after_ms")]
    #[validate(range(min = 1))]
    pub retire_after_ms: u64,

    /// Released devices whose watermark is still remembered
    #[serde(default = "default_retired_capacity")]
    #[validate(range(min = 1))]
    pub retired_capacity: u64,

    /// Metrics log period (wall clock)
    #[serde(default = "default_metrics_log_interval_ms")]
    #[validate(range(min = 1_000))]
    pub metrics_log_interval_ms: u64,

    /// Queue rejected out-of-order samples for raw storage
    #[serde(default)]
    pub store_stale_samples: bool,
}

fn default_idle_threshold_ms() -> u64 {
    30_000
}

fn default_close_threshold_ms() -> u64 {
    300_000
}

fn default_silence_threshold_ms() -> u64 {
    120_000
}

fn default_low_quality_window() -> usize {
    10
}

fn default_low_quality_threshold() -> f64 {
    0.3
}

fn default_low_quality_debounce_ms() -> u64 {
    60_000
}

fn default_sweep_interval_ms() -> u64 {
    5_000
}

fn default_device_queue_capacity() -> usize {
    256
}

fn default_subscriber_capacity() -> usize {
    64
}

fn default_persist_queue_capacity() -> usize {
    4096
}

fn default_persist_max_attempts() -> u32 {
    5
}

fn default_persist_backoff_base_ms() -> u64 {
    100
}

fn default_persist_backoff_max_ms() -> u64 {
    5_000
}

fn default_retire_after_ms() -> u64 {
    60_000
}

fn default_retired_capacity() -> u64 {
    100_000
}

fn default_metrics_log_interval_ms() -> u64 {
    60_000
}

fn validate_thresholds(config: &EngineConfig) -> std::result::Result<(), ValidationError> {
    if config.close_threshold_ms <= config.idle_threshold_ms {
        let mut err = ValidationError::new("close_threshold_ms");
        err.message = Some("close_threshold_ms must exceed idle_threshold_ms".into());
        return Err(err);
    }
    if config.persist_backoff_max_ms < config.persist_backoff_base_ms {
        let mut err = ValidationError::new("persist_backoff_max_ms");
        err.message = Some("persist_backoff_max_ms must be at least persist_backoff_base_ms".into());
        return Err(err);
    }
    Ok(())
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: default_idle_threshold_ms(),
            close_threshold_ms: default_close_threshold_ms(),
            silence_threshold_ms: default_silence_threshold_ms(),
            low_quality_window: default_low_quality_window(),
            low_quality_threshold: default_low_quality_threshold(),
            low_quality_debounce_ms: default_low_quality_debounce_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            device_queue_capacity: default_device_queue_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            persist_queue_capacity: default_persist_queue_capacity(),
            persist_max_attempts: default_persist_max_attempts(),
            persist_backoff_base_ms: default_persist_backoff_base_ms(),
            persist_backoff_max_ms: default_persist_backoff_max_ms(),
            retire_after_ms: default_retire_after_ms(),
            retired_capacity: default_retired_capacity(),
            metrics_log_interval_ms: default_metrics_log_interval_ms(),
            store_stale_samples: false,
        }
    }
}

impl EngineConfig {
    /// Validates the config, mapping failures to `Error::Config`.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid engine config: {}", e)))?;
        Ok(self)
    }

    pub fn idle_threshold(&self) -> i64 {
        self.idle_threshold_ms as i64
    }

    pub fn close_threshold(&self) -> i64 {
        self.close_threshold_ms as i64
    }

    pub fn silence_threshold(&self) -> i64 {
        self.silence_threshold_ms as i64
    }

    pub fn retire_after(&self) -> i64 {
        self.retire_after_ms as i64
    }

    pub fn low_quality_debounce(&self) -> i64 {
        self.low_quality_debounce_ms as i64
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_log_interval_ms)
    }
}
