//! Backoff policy for retryable failures
//!
//! Two delay tracks exist side by side: the server-hinted wait (what a 429/5xx
//! reply asks for) and a local exponential counter (used when the transport
//! itself fails with a retry-worthy error). Both get the same jitter.

use std::sync::LazyLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::config::RetryConfig;

/// Free-text wait hint in error bodies, e.g. "Please try again after 2.5 seconds"
static AFTER_SECONDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)after\s+([0-9]+(?:\.[0-9]+)?)\s*seconds?").expect("static regex is valid")
});

/// Wait used when the server gives no usable hint
pub const DEFAULT_WAIT_SECS: u64 = 1;

/// Retry timing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Attempts per candidate (first try included)
    pub max_attempts: u32,

    /// Exponential counter starting value
    pub initial_delay_ms: u64,

    /// Exponential counter ceiling
    pub max_delay_ms: u64,

    /// Upper bound (exclusive) of the uniform jitter added to every wait
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 16_000,
            jitter_ms: 250,
        }
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter_ms: config.jitter_ms,
        }
    }
}

impl BackoffPolicy {
    /// Advance the exponential counter: double, capped at `max_delay_ms`
    pub fn next_delay(&self, previous_ms: u64) -> u64 {
        previous_ms.saturating_mul(2).min(self.max_delay_ms)
    }

    /// Uniform random jitter in `[0, jitter_ms)`
    pub fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..self.jitter_ms))
    }

    /// Sleep duration for a server-hinted wait
    pub fn hinted_wait(&self, wait_secs: u64) -> Duration {
        Duration::from_secs(wait_secs) + self.jitter()
    }

    /// Sleep duration for the exponential track
    pub fn exponential_wait(&self, delay_ms: u64) -> Duration {
        Duration::from_millis(delay_ms) + self.jitter()
    }
}

/// Derive a wait (whole seconds, at least 1) from a reply's hints
///
/// A numeric, non-negative `retry-after` header wins and is floored. Otherwise
/// the body is searched for "after N seconds" and N is rounded. Without either
/// the wait is one second.
pub fn retry_after_from_hint(header: Option<&str>, body: &str) -> u64 {
    debug!(?header, body_len = body.len(), "retry_after_from_hint: called");
    if let Some(raw) = header
        && let Ok(hint) = raw.trim().parse::<f64>()
        && hint.is_finite()
        && hint >= 0.0
    {
        debug!(%hint, "retry_after_from_hint: using header");
        return (hint.floor() as u64).max(1);
    }

    if let Some(caps) = AFTER_SECONDS_RE.captures(body)
        && let Ok(secs) = caps[1].parse::<f64>()
    {
        debug!(%secs, "retry_after_from_hint: using body text");
        return (secs.round() as u64).max(1);
    }

    debug!("retry_after_from_hint: no hint, using default");
    DEFAULT_WAIT_SECS
}
