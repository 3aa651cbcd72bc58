//! Periodic background jobs.
//!
//! Two jobs keep the call state honest without a client prompting them:
//!
//! - [`ExpirySweep`] turns unanswered invitations into Missed
//! - [`SessionTick`] enforces the quota and per-call ceiling on live calls
//!
//! Each runs inside a [`PeriodicTask`] that stops when the shutdown watch
//! flips to `true`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use super::call_controller::CallController;

/// One unit of periodic work.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs one pass. Returns how many items it acted on.
    async fn run_once(&self) -> usize;
}

/// Moves expired Pending invitations to Missed.
pub struct ExpirySweep {
    controller: Arc<CallController>,
}

impl ExpirySweep {
    pub fn new(controller: Arc<CallController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl PeriodicJob for ExpirySweep {
    fn name(&self) -> &'static str {
        "expiry_sweep"
    }

    async fn run_once(&self) -> usize {
        self.controller.sweep_expired().await
    }
}

/// Checks live sessions against their limits.
pub struct SessionTick {
    controller: Arc<CallController>,
}

impl SessionTick {
    pub fn new(controller: Arc<CallController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl PeriodicJob for SessionTick {
    fn name(&self) -> &'static str {
        "session_tick"
    }

    async fn run_once(&self) -> usize {
        let report = self
            .controller
            .sessions()
            .tick(&self.controller)
            .await;
        report.ended.len()
    }
}

/// Drives a job on a fixed interval until shutdown.
pub struct PeriodicTask {
    job: Arc<dyn PeriodicJob>,
    interval: Duration,
}

impl PeriodicTask {
    pub fn new(job: Arc<dyn PeriodicJob>, interval: Duration) -> Self {
        Self { job, interval }
    }

    /// Runs until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(job = self.job.name(), interval_ms = self.interval.as_millis() as u64, "Periodic job started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(job = self.job.name(), "Periodic job stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    let acted = self.job.run_once().await;
                    if acted > 0 {
                        tracing::debug!(job = self.job.name(), acted, "Periodic job pass");
                    }
                }
            }
        }
    }
}
