//! Timers driving the gateway: the sweep and the metrics log.

use std::sync::Arc;
use telemetry::{health, metrics};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::gateway::{now_ms, Gateway};

pub struct Scheduler {
    gateway: Arc<Gateway>,
}

impl Scheduler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Starts the background timers.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_sweep().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_log().await;
        }));

        info!("Scheduler started");
        handles
    }

    async fn run_sweep(&self) {
        let mut ticker = interval(self.gateway.config().sweep_interval());
        // A slow sweep should not be followed by a burst of catch-up sweeps.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let summary = self.gateway.sweep(now_ms()).await;
            if summary.events.is_empty() && summary.closed.is_empty() && summary.went_idle == 0 {
                debug!(devices = summary.devices, "Sweep complete");
            } else {
                info!(
                    devices = summary.devices,
                    went_idle = summary.went_idle,
                    closed = summary.closed.len(),
                    retired = summary.retired,
                    emergencies = summary.events.len(),
                    "Sweep complete"
                );
            }
        }
    }

    async fn run_metrics_log(&self) {
        let mut ticker = interval(self.gateway.config().metrics_log_interval());

        loop {
            ticker.tick().await;

            let snapshot = metrics().snapshot();
            info!(
                received = snapshot.samples_received,
                accepted = snapshot.samples_accepted,
                invalid = snapshot.samples_invalid,
                stale = snapshot.samples_stale,
                emergencies = snapshot.emergencies_emitted,
                active_sessions = snapshot.active_sessions,
                active_devices = snapshot.active_devices,
                subscribers = snapshot.live_subscribers,
                persist_queue = snapshot.persist_queue_depth,
                persist_failures = snapshot.persist_failures,
                ingest_mean_us = snapshot.ingest_latency_mean_us,
                status = health().report().status.as_str(),
                "Metrics"
            );
        }
    }
}
