//! Image generation with retries and size fallback
//!
//! - [`backoff`] - delay policy and retry-after hint parsing
//! - [`candidates`] - ordered size variants
//! - [`orchestrator`] - drives candidates and attempts against an [`ImageClient`](crate::api::ImageClient)

pub mod backoff;
pub mod candidates;
mod error;
pub mod orchestrator;

pub use backoff::{BackoffPolicy, DEFAULT_WAIT_SECS, retry_after_from_hint};
pub use candidates::{SizeCandidate, size_candidates};
pub use error::{GENERIC_FAILURE, GenerateError};
pub use orchestrator::{AttemptOutcome, GenerateOptions, Orchestrator, RetryState, classify_reply, decode_artifact};
