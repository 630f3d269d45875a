//! Event bus for live run observability
//!
//! The orchestrator emits status lines and attempt events, the progress
//! monitor emits percent ticks, the session emits the terminal event. The CLI
//! subscribes and renders them (or prints them as JSON lines).

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, drain};
pub use types::GenerateEvent;
