//! Completion signal shared between the orchestrator and the monitor

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::generate::GenerateError;

/// What the completion predicate reports on a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Nothing written yet
    Pending,
    /// The orchestrator succeeded
    Done,
    /// The orchestrator failed with this error
    Failed(GenerateError),
}

/// Write-once completion cell
///
/// The orchestrator writes exactly once; the monitor reads on every tick.
/// Clones share the same cell.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    cell: Arc<OnceLock<Result<PathBuf, GenerateError>>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record success. Returns false if the signal was already written.
    pub fn complete(&self, path: PathBuf) -> bool {
        debug!(?path, "CompletionSignal::complete: called");
        self.cell.set(Ok(path)).is_ok()
    }

    /// Record failure. Returns false if the signal was already written.
    pub fn fail(&self, error: GenerateError) -> bool {
        debug!(%error, "CompletionSignal::fail: called");
        self.cell.set(Err(error)).is_ok()
    }

    /// Record the outcome of a generation
    pub fn record(&self, outcome: &Result<PathBuf, GenerateError>) -> bool {
        match outcome {
            Ok(path) => self.complete(path.clone()),
            Err(e) => self.fail(e.clone()),
        }
    }

    pub fn poll(&self) -> PollResult {
        match self.cell.get() {
            None => PollResult::Pending,
            Some(Ok(_)) => PollResult::Done,
            Some(Err(e)) => PollResult::Failed(e.clone()),
        }
    }
}
