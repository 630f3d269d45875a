//! Time-based progress estimation
//!
//! The remote call gives no progress of its own, so the monitor estimates it
//! from elapsed time against a nominal duration. It never decides success: it
//! only reports what the completion predicate says.

use std::time::Duration;

use tracing::{debug, info};

use super::signal::PollResult;
use crate::clock::Clock;
use crate::config::ProgressConfig;
use crate::events::EventEmitter;
use crate::generate::GenerateError;

/// Highest percent shown before completion is observed
pub const PENDING_CAP: u8 = 99;

/// Snapshot of the monitor after the latest tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub elapsed: Duration,
    pub percent: u8,
    pub completion_observed: bool,
}

/// What a tick decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Completed,
    Failed(GenerateError),
}

#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    tick_interval: Duration,
    estimated_total: Duration,
    state: ProgressState,
}

impl ProgressMonitor {
    pub fn new(tick_interval: Duration, estimated_total: Duration) -> Self {
        debug!(?tick_interval, ?estimated_total, "ProgressMonitor::new: called");
        Self {
            tick_interval,
            estimated_total,
            state: ProgressState::default(),
        }
    }

    pub fn from_config(config: &ProgressConfig) -> Self {
        Self::new(config.tick(), config.estimated_duration())
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    /// `floor(elapsed / estimated_total * 100)`, clamped to 100
    pub fn estimate(elapsed: Duration, estimated_total: Duration) -> u8 {
        let total = estimated_total.as_millis().max(1);
        let percent = elapsed.as_millis().saturating_mul(100) / total;
        percent.min(100) as u8
    }

    /// Advance the estimate to `elapsed` and observe the predicate
    ///
    /// Percent never goes down, stays at or below 99 while pending and jumps
    /// to 100 once success is observed. After success further ticks are no-ops.
    pub fn tick(&mut self, elapsed: Duration, poll: &PollResult) -> TickOutcome {
        if self.state.completion_observed {
            return TickOutcome::Completed;
        }

        let estimate = Self::estimate(elapsed, self.estimated_total).min(PENDING_CAP);
        self.state.elapsed = elapsed;
        self.state.percent = self.state.percent.max(estimate);

        match poll {
            PollResult::Pending => TickOutcome::Continue,
            PollResult::Done => {
                self.state.completion_observed = true;
                self.state.percent = 100;
                TickOutcome::Completed
            }
            PollResult::Failed(e) => TickOutcome::Failed(e.clone()),
        }
    }

    /// Tick on `clock` until the predicate reports completion or failure
    ///
    /// Emits a progress event per tick. `on_complete` runs once on success;
    /// a failure is returned without calling it.
    pub async fn watch(
        &mut self,
        clock: &dyn Clock,
        mut predicate: impl FnMut() -> PollResult + Send,
        on_complete: impl FnOnce() + Send,
        events: &EventEmitter,
    ) -> Result<(), GenerateError> {
        debug!("watch: called");
        let start = clock.now();

        loop {
            clock.sleep(self.tick_interval).await;
            let elapsed = clock.now().saturating_sub(start);
            let poll = predicate();

            match self.tick(elapsed, &poll) {
                TickOutcome::Continue => events.progress(self.state.percent),
                TickOutcome::Completed => {
                    events.progress(self.state.percent);
                    info!(?elapsed, "watch: completion observed");
                    on_complete();
                    return Ok(());
                }
                TickOutcome::Failed(e) => {
                    debug!(error = %e, percent = self.state.percent, "watch: failure observed");
                    return Err(e);
                }
            }
        }
    }
}
