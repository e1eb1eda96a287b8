//! Session aggregation and emergency detection for ResqPulse devices.
//!
//! Samples flow validator → scorer → per-device worker (aggregator and
//! detector) → dispatcher, which feeds the persistence worker and live
//! subscribers.

pub mod aggregator;
pub mod config;
pub mod detector;
pub mod device;
pub mod dispatcher;
pub mod gateway;
pub mod persistence;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{Carryover, SessionAggregator, Transition};
pub use config::EngineConfig;
pub use detector::EmergencyDetector;
pub use device::{DeviceState, SampleOutcome, SweepOutcome};
pub use dispatcher::{Dispatcher, LiveUpdate, PersistJob};
pub use gateway::{now_ms, Gateway, SweepSummary};
pub use persistence::{PersistenceWorker, RetryPolicy};
pub use scheduler::Scheduler;
pub use worker::{DeviceHandle, IngestReceipt, RetiredDevices};
