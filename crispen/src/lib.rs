//! Crispen - resilient client for AI image upscale and restore
//!
//! Sends an image and a prompt to a remote image-edit endpoint, retrying on
//! rate limits and server errors, falling back across output sizes, and
//! estimating progress while the single long request is in flight.
//!
//! # Modules
//!
//! - [`generate`] - backoff policy, size candidates and the retry orchestrator
//! - [`progress`] - completion signal and time-based progress monitor
//! - [`api`] - image client trait and the OpenAI implementation
//! - [`host`] - document, key store, work folder and layer surfaces
//! - [`session`] - one run from document to placed layer
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod events;
pub mod generate;
pub mod host;
pub mod progress;
pub mod session;

pub use api::{ApiReply, EditRequest, ImageClient, OpenAIImageClient, SizeToken, create_client};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::Config;
pub use events::{EventBus, EventEmitter, GenerateEvent};
pub use generate::{BackoffPolicy, GenerateError, GenerateOptions, Orchestrator, size_candidates};
pub use progress::{CompletionSignal, PollResult, ProgressMonitor};
pub use session::{Mode, Session};
