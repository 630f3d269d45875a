//! Event types for generation activity
//!
//! These events are everything a front end can observe about a run:
//! - Status text (transient retry notices, candidate transitions)
//! - Attempt bookkeeping
//! - Progress ticks (0-100)
//! - Terminal completion or failure

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::SizeToken;

/// Core event enum - the vocabulary of a generation run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GenerateEvent {
    /// Human-readable status line
    Status { message: String, is_error: bool },

    /// A remote call is about to be issued
    AttemptStarted {
        size: SizeToken,
        attempt: u32,
        max_attempts: u32,
    },

    /// Progress estimate from the monitor
    Progress { percent: u8 },

    /// The output layer was placed
    Completed { path: PathBuf, layer_name: String },

    /// The run ended with an error
    Failed { message: String },
}

impl GenerateEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            GenerateEvent::Status { .. } => "Status",
            GenerateEvent::AttemptStarted { .. } => "AttemptStarted",
            GenerateEvent::Progress { .. } => "Progress",
            GenerateEvent::Completed { .. } => "Completed",
            GenerateEvent::Failed { .. } => "Failed",
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerateEvent::Completed { .. } | GenerateEvent::Failed { .. })
    }
}
