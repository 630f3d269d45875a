//! Generation error types

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::api::SizeToken;

/// Message used when every candidate failed but nothing was recorded
pub const GENERIC_FAILURE: &str = "Image generation failed after retries.";

/// Transport messages matching this are treated as retryable
static RETRY_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)rate limited|429|retry").expect("static regex is valid"));

/// Errors that can occur while generating an image
///
/// Every variant is `Clone` so the terminal error can be shared through the
/// completion signal and read on every progress tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerateError {
    /// 429 or 5xx; retried on the same candidate after the hinted wait
    #[error("Rate limited. Waiting {wait_secs} seconds before retry {next_attempt} of {max_attempts} on {size}.")]
    RateLimited {
        wait_secs: u64,
        next_attempt: u32,
        max_attempts: u32,
        size: SizeToken,
    },

    /// Any other non-2xx status; ends the current candidate
    #[error("OpenAI error {status}. {body}")]
    ClientRejected { status: u16, body: String },

    /// 2xx without a usable image payload
    #[error("No image returned.")]
    MalformedResponse { detail: String },

    /// 2xx whose body is not JSON at all
    #[error("Invalid response from OpenAI: {detail}")]
    InvalidJson { detail: String },

    /// Transport-level failure (connect, timeout, body read)
    #[error("{message}")]
    Network { message: String },

    /// The artifact could not be written to the work folder
    #[error("Failed to write output image: {0}")]
    Persist(String),

    /// All candidates and attempts consumed
    #[error("{}", exhausted_message(.last))]
    Exhausted { last: Option<Box<GenerateError>> },
}

fn exhausted_message(last: &Option<Box<GenerateError>>) -> String {
    match last {
        Some(err) => err.to_string(),
        None => GENERIC_FAILURE.to_string(),
    }
}

impl GenerateError {
    /// Build a network error from any transport error
    pub fn network(err: impl std::fmt::Display) -> Self {
        GenerateError::Network {
            message: err.to_string(),
        }
    }

    /// Check if this error is retryable on the same candidate
    ///
    /// Transport failures are retried only when their message mentions a rate
    /// limit or retry condition; everything else moves on to the next size.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerateError::RateLimited { .. } => true,
            GenerateError::Network { message } => RETRY_HINT_RE.is_match(message),
            GenerateError::ClientRejected { .. } => false,
            GenerateError::MalformedResponse { .. } => false,
            GenerateError::InvalidJson { .. } => false,
            GenerateError::Persist(_) => false,
            GenerateError::Exhausted { .. } => false,
        }
    }
}
