//! Progress estimation for a running generation
//!
//! The orchestrator writes a [`CompletionSignal`] once; the
//! [`ProgressMonitor`] polls it on every tick.

mod monitor;
mod signal;

pub use monitor::{PENDING_CAP, ProgressMonitor, ProgressState, TickOutcome};
pub use signal::{CompletionSignal, PollResult};
