//! Event Bus - pub/sub for generation events
//!
//! The EventBus uses a tokio broadcast channel so the orchestrator and the
//! progress monitor can report without knowing who (if anyone) is rendering.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::GenerateEvent;
use crate::api::SizeToken;

/// Default channel capacity (events)
/// A 90s run ticking every 150ms produces ~600 progress events
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Central event bus for a run
pub struct EventBus {
    tx: broadcast::Sender<GenerateEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Subscribe to receive events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerateEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter handle
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter { tx: self.tx.clone() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for components to emit events without owning the bus
///
/// Cheap to clone. Emitting with no subscribers is not an error.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<GenerateEvent>,
}

impl EventEmitter {
    /// An emitter nobody listens to
    pub fn detached() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Emit a raw event
    pub fn emit(&self, event: GenerateEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    /// Emit a status line
    pub fn status(&self, message: impl Into<String>, is_error: bool) {
        self.emit(GenerateEvent::Status {
            message: message.into(),
            is_error,
        });
    }

    /// Emit an attempt started event
    pub fn attempt_started(&self, size: SizeToken, attempt: u32, max_attempts: u32) {
        self.emit(GenerateEvent::AttemptStarted {
            size,
            attempt,
            max_attempts,
        });
    }

    /// Emit a progress tick
    pub fn progress(&self, percent: u8) {
        self.emit(GenerateEvent::Progress { percent });
    }

    /// Emit a completion event
    pub fn completed(&self, path: impl Into<std::path::PathBuf>, layer_name: &str) {
        self.emit(GenerateEvent::Completed {
            path: path.into(),
            layer_name: layer_name.to_string(),
        });
    }

    /// Emit a failure event
    pub fn failed(&self, message: impl Into<String>) {
        self.emit(GenerateEvent::Failed {
            message: message.into(),
        });
    }
}

/// Drain every event currently queued on a receiver
pub fn drain(rx: &mut broadcast::Receiver<GenerateEvent>) -> Vec<GenerateEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "drain: receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}
