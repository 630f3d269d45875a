//! Remote call orchestration
//!
//! Walks the size candidates in order. Within a candidate, attempts are retried
//! while the failure is retryable (rate limit, server error, or a transport
//! error that says "retry"); any other failure moves straight on to the next
//! candidate. The first well-formed image is written once and returned.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info, warn};

use super::backoff::{BackoffPolicy, retry_after_from_hint};
use super::candidates::size_candidates;
use super::error::GenerateError;
use crate::api::{ApiReply, EditRequest, EditResponse, ImageClient, SizeToken};
use crate::clock::Clock;
use crate::config::Config;
use crate::events::EventEmitter;
use crate::host::ArtifactStore;

/// Request parameters shared by every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    pub model: String,
    pub quality: String,
    pub size: SizeToken,
    pub fallback_size: SizeToken,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: "gpt-image-1.5".to_string(),
            quality: "high".to_string(),
            size: SizeToken::Auto,
            fallback_size: SizeToken::SQUARE_1024,
        }
    }
}

impl GenerateOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.api.model.clone(),
            quality: config.api.quality.clone(),
            size: config.size.preference,
            fallback_size: config.size.fallback,
        }
    }
}

/// Per-candidate retry bookkeeping
///
/// `hinted_wait_secs` is what the server asked for last; `delay_ms` is the
/// local exponential counter. Only transport retries sleep on `delay_ms`, but
/// it advances on every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub delay_ms: u64,
    pub hinted_wait_secs: Option<u64>,
}

impl RetryState {
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self {
            attempt: 1,
            delay_ms: policy.initial_delay_ms,
            hinted_wait_secs: None,
        }
    }

    pub fn has_attempts_left(&self, policy: &BackoffPolicy) -> bool {
        self.attempt <= policy.max_attempts
    }

    /// Bookkeeping after sleeping on a server hint
    pub fn record_hinted_retry(&mut self, policy: &BackoffPolicy, wait_secs: u64) {
        self.hinted_wait_secs = Some(wait_secs);
        self.delay_ms = policy.next_delay(self.delay_ms);
        self.attempt += 1;
    }

    /// Bookkeeping after sleeping on the exponential counter
    pub fn record_exponential_retry(&mut self, policy: &BackoffPolicy) {
        self.delay_ms = policy.next_delay(self.delay_ms);
        self.attempt += 1;
    }
}

/// Result of a single remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Decoded image bytes
    Success(Vec<u8>),
    /// 429/5xx; wait this long and retry
    RetryableFailure { wait_secs: u64 },
    /// Transport error that asked for a retry; wait on the exponential counter
    RetryableException(GenerateError),
    /// Ends the current candidate
    TerminalFailure(GenerateError),
    /// 2xx without a usable image or with an unparseable body; ends the current candidate
    Malformed(GenerateError),
}

/// Classify a reply that made it back from the server
pub fn classify_reply(reply: &ApiReply) -> AttemptOutcome {
    debug!(status = reply.status, "classify_reply: called");
    if reply.is_rate_limited() {
        let wait_secs = retry_after_from_hint(reply.retry_after.as_deref(), &reply.body);
        return AttemptOutcome::RetryableFailure { wait_secs };
    }

    if !reply.is_success() {
        return AttemptOutcome::TerminalFailure(GenerateError::ClientRejected {
            status: reply.status,
            body: reply.body.clone(),
        });
    }

    match decode_artifact(&reply.body) {
        Ok(bytes) => AttemptOutcome::Success(bytes),
        Err(e) => AttemptOutcome::Malformed(e),
    }
}

/// Pull `data[0].b64_json` out of a success body and decode it
pub fn decode_artifact(body: &str) -> Result<Vec<u8>, GenerateError> {
    let response: EditResponse =
        serde_json::from_str(body).map_err(|e| GenerateError::InvalidJson { detail: e.to_string() })?;

    let b64 = response.first_image().ok_or_else(|| GenerateError::MalformedResponse {
        detail: "response has no data[0].b64_json".to_string(),
    })?;

    let bytes = BASE64.decode(b64.trim()).map_err(|e| GenerateError::MalformedResponse {
        detail: format!("invalid base64: {}", e),
    })?;

    if bytes.is_empty() {
        return Err(GenerateError::MalformedResponse {
            detail: "decoded image is empty".to_string(),
        });
    }
    Ok(bytes)
}

/// Drives candidates and retries until an image is written or all fail
pub struct Orchestrator {
    client: Arc<dyn ImageClient>,
    store: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
    options: GenerateOptions,
    events: EventEmitter,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ImageClient>,
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        policy: BackoffPolicy,
        options: GenerateOptions,
        events: EventEmitter,
    ) -> Self {
        debug!(?policy, ?options, "Orchestrator::new: called");
        Self {
            client,
            store,
            clock,
            policy,
            options,
            events,
        }
    }

    /// Generate an image from `image` and `prompt`
    ///
    /// Returns the path of the written artifact. On failure the error is
    /// `Exhausted`, carrying the last failure recorded along the way.
    pub async fn generate(&self, image: Arc<[u8]>, prompt: &str) -> Result<PathBuf, GenerateError> {
        info!(
            image_len = image.len(),
            size = %self.options.size,
            model = %self.options.model,
            "generate: starting"
        );
        let candidates = size_candidates(self.options.size, self.options.fallback_size);
        let mut last_error: Option<GenerateError> = None;

        for candidate in &candidates {
            debug!(size = %candidate.size, ordinal = candidate.ordinal, "generate: trying candidate");
            let request = EditRequest {
                model: self.options.model.clone(),
                prompt: prompt.to_string(),
                size: candidate.size,
                quality: self.options.quality.clone(),
                image: image.clone(),
            };

            let mut state = RetryState::new(&self.policy);
            while state.has_attempts_left(&self.policy) {
                self.events
                    .attempt_started(candidate.size, state.attempt, self.policy.max_attempts);

                match self.attempt(&request).await {
                    AttemptOutcome::Success(bytes) => match self.store.write_artifact(&bytes) {
                        Ok(path) => {
                            info!(?path, size = %candidate.size, attempt = state.attempt, "generate: success");
                            return Ok(path);
                        }
                        Err(e) => {
                            warn!(error = %e, "generate: failed to persist artifact");
                            last_error = Some(GenerateError::Persist(format!("{:#}", e)));
                            break;
                        }
                    },
                    AttemptOutcome::RetryableFailure { wait_secs } => {
                        let err = GenerateError::RateLimited {
                            wait_secs,
                            next_attempt: state.attempt + 1,
                            max_attempts: self.policy.max_attempts,
                            size: candidate.size,
                        };
                        warn!(attempt = state.attempt, wait_secs, size = %candidate.size, "generate: rate limited");
                        self.events.status(err.to_string(), true);
                        last_error = Some(err);

                        self.clock.sleep(self.policy.hinted_wait(wait_secs)).await;
                        state.record_hinted_retry(&self.policy, wait_secs);
                    }
                    AttemptOutcome::RetryableException(err) => {
                        warn!(
                            attempt = state.attempt,
                            delay_ms = state.delay_ms,
                            error = %err,
                            "generate: retrying after transient error"
                        );
                        last_error = Some(err);

                        self.clock.sleep(self.policy.exponential_wait(state.delay_ms)).await;
                        state.record_exponential_retry(&self.policy);
                    }
                    AttemptOutcome::TerminalFailure(err) | AttemptOutcome::Malformed(err) => {
                        debug!(error = %err, size = %candidate.size, "generate: candidate failed");
                        last_error = Some(err);
                        break;
                    }
                }
            }

            self.events.status(
                format!("Could not generate at {}. Trying another size if available.", candidate.size),
                true,
            );
        }

        warn!(last_error = ?last_error, "generate: all candidates exhausted");
        Err(GenerateError::Exhausted {
            last: last_error.map(Box::new),
        })
    }

    /// Issue one request and classify what came back
    async fn attempt(&self, request: &EditRequest) -> AttemptOutcome {
        match self.client.edit(request).await {
            Ok(reply) => classify_reply(&reply),
            Err(err) if err.is_retryable() => AttemptOutcome::RetryableException(err),
            Err(err) => AttemptOutcome::TerminalFailure(err),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::client::mock::MockImageClient;
    use crate::clock::ManualClock;
    use crate::events::{EventBus, GenerateEvent, drain};
    use eyre::eyre;
    use std::sync::Mutex;
    use std::time::Duration;

    /// The failure recorded behind an `Exhausted` error
    pub(crate) fn last_failure(err: &GenerateError) -> Option<&GenerateError> {
        match err {
            GenerateError::Exhausted { last } => last.as_deref(),
            _ => None,
        }
    }

    /// JSON body of a successful edit carrying `bytes`
    pub(crate) fn success_body(bytes: &[u8]) -> String {
        serde_json::json!({ "data": [{ "b64_json": BASE64.encode(bytes) }] }).to_string()
    }

    /// Artifact store that records writes in memory
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub(crate) writes: Mutex<Vec<Vec<u8>>>,
        pub(crate) fail: bool,
    }

    impl RecordingStore {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn write_count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }
    }

    impl ArtifactStore for RecordingStore {
        fn write_artifact(&self, bytes: &[u8]) -> eyre::Result<PathBuf> {
            if self.fail {
                return Err(eyre!("disk full"));
            }
            self.writes.lock().unwrap().push(bytes.to_vec());
            Ok(PathBuf::from("output.png"))
        }
    }

    fn quiet_policy() -> BackoffPolicy {
        BackoffPolicy {
            jitter_ms: 0,
            ..BackoffPolicy::default()
        }
    }

    struct Harness {
        client: Arc<MockImageClient>,
        store: Arc<RecordingStore>,
        clock: Arc<ManualClock>,
        bus: EventBus,
        orchestrator: Orchestrator,
    }

    fn harness(
        replies: Vec<Result<ApiReply, GenerateError>>,
        policy: BackoffPolicy,
        size: SizeToken,
        store: RecordingStore,
    ) -> Harness {
        let client = Arc::new(MockImageClient::new(replies));
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new());
        let bus = EventBus::new(256);
        let options = GenerateOptions {
            size,
            ..GenerateOptions::default()
        };
        let orchestrator = Orchestrator::new(
            client.clone(),
            store.clone(),
            clock.clone(),
            policy,
            options,
            bus.emitter(),
        );
        Harness {
            client,
            store,
            clock,
            bus,
            orchestrator,
        }
    }

    fn image() -> Arc<[u8]> {
        Arc::from(vec![0x89, b'P', b'N', b'G'])
    }

    fn statuses(events: &[GenerateEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                GenerateEvent::Status { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_classify_reply() {
        assert_eq!(
            classify_reply(&ApiReply::new(429, "").with_retry_after("3")),
            AttemptOutcome::RetryableFailure { wait_secs: 3 }
        );
        assert_eq!(
            classify_reply(&ApiReply::new(502, "try again after 4 seconds")),
            AttemptOutcome::RetryableFailure { wait_secs: 4 }
        );
        assert!(matches!(
            classify_reply(&ApiReply::new(400, "bad size")),
            AttemptOutcome::TerminalFailure(GenerateError::ClientRejected { status: 400, .. })
        ));
        assert!(matches!(
            classify_reply(&ApiReply::new(200, r#"{"data":[]}"#)),
            AttemptOutcome::Malformed(GenerateError::MalformedResponse { .. })
        ));
        assert_eq!(
            classify_reply(&ApiReply::new(200, success_body(b"img"))),
            AttemptOutcome::Success(b"img".to_vec())
        );
    }

    #[test]
    fn test_decode_artifact_errors() {
        assert!(matches!(decode_artifact("not json"), Err(GenerateError::InvalidJson { .. })));
        assert!(decode_artifact(r#"{"data":[{"b64_json":"%%%"}]}"#).is_err());
        assert!(decode_artifact(r#"{"data":[{"b64_json":""}]}"#).is_err());
        assert_eq!(decode_artifact(&success_body(b"abc")).unwrap(), b"abc");
    }

    #[test]
    fn test_retry_state_tracks_both_delays() {
        let policy = quiet_policy();
        let mut state = RetryState::new(&policy);
        assert_eq!(state.attempt, 1);
        assert_eq!(state.delay_ms, 1000);

        state.record_hinted_retry(&policy, 7);
        assert_eq!(state.attempt, 2);
        assert_eq!(state.hinted_wait_secs, Some(7));
        assert_eq!(state.delay_ms, 2000);

        state.record_exponential_retry(&policy);
        assert_eq!(state.attempt, 3);
        assert_eq!(state.delay_ms, 4000);
        assert_eq!(state.hinted_wait_secs, Some(7));

        for _ in 0..2 {
            state.record_exponential_retry(&policy);
        }
        assert!(!state.has_attempts_left(&policy));
    }

    #[tokio::test]
    async fn test_first_attempt_success_writes_once() {
        let h = harness(
            vec![Ok(ApiReply::new(200, success_body(b"crisp")))],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::default(),
        );

        let path = h.orchestrator.generate(image(), "Upscale").await.unwrap();
        assert_eq!(path, PathBuf::from("output.png"));
        assert_eq!(h.client.call_count(), 1);
        assert_eq!(h.store.write_count(), 1);
        assert_eq!(h.store.writes.lock().unwrap()[0], b"crisp");
        assert!(h.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let h = harness(
            vec![
                Ok(ApiReply::new(429, "slow down").with_retry_after("2")),
                Ok(ApiReply::new(200, success_body(b"crisp"))),
            ],
            BackoffPolicy::default(),
            SizeToken::Auto,
            RecordingStore::default(),
        );
        let mut rx = h.bus.subscribe();

        h.orchestrator.generate(image(), "Upscale").await.unwrap();

        let sleeps = h.clock.sleeps();
        assert_eq!(sleeps.len(), 1);
        assert!(sleeps[0] >= Duration::from_secs(2));
        assert!(sleeps[0] < Duration::from_millis(2250));
        assert_eq!(h.client.call_count(), 2);
        assert_eq!(h.store.write_count(), 1);

        let events = drain(&mut rx);
        assert_eq!(
            statuses(&events),
            vec!["Rate limited. Waiting 2 seconds before retry 2 of 5 on auto.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_client_error_falls_back_immediately() {
        let h = harness(
            vec![
                Ok(ApiReply::new(400, "size auto not supported")),
                Ok(ApiReply::new(200, success_body(b"square"))),
            ],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::default(),
        );
        let mut rx = h.bus.subscribe();

        h.orchestrator.generate(image(), "Restore").await.unwrap();

        assert_eq!(h.client.sizes(), vec![SizeToken::Auto, SizeToken::SQUARE_1024]);
        assert!(h.clock.sleeps().is_empty());
        assert_eq!(h.store.write_count(), 1);
        assert_eq!(
            statuses(&drain(&mut rx)),
            vec!["Could not generate at auto. Trying another size if available.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_exhausts_both_candidates() {
        let replies = (0..20).map(|_| Ok(ApiReply::new(503, "overloaded"))).collect();
        let h = harness(replies, quiet_policy(), SizeToken::Auto, RecordingStore::default());

        let err = h.orchestrator.generate(image(), "Upscale").await.unwrap_err();

        assert_eq!(h.client.call_count(), 10);
        assert_eq!(h.clock.sleeps().len(), 10);
        assert!(h.clock.sleeps().iter().all(|d| *d == Duration::from_secs(1)));
        assert_eq!(h.store.write_count(), 0);

        let sizes = h.client.sizes();
        assert!(sizes[..5].iter().all(|s| *s == SizeToken::Auto));
        assert!(sizes[5..].iter().all(|s| *s == SizeToken::SQUARE_1024));

        assert!(matches!(
            last_failure(&err),
            Some(GenerateError::RateLimited {
                size: SizeToken::SQUARE_1024,
                ..
            })
        ));
        assert_eq!(
            err.to_string(),
            "Rate limited. Waiting 1 seconds before retry 6 of 5 on 1024x1024."
        );
    }

    #[tokio::test]
    async fn test_fixed_size_has_single_candidate() {
        let replies = (0..20).map(|_| Ok(ApiReply::new(429, ""))).collect();
        let h = harness(replies, quiet_policy(), SizeToken::SQUARE_1024, RecordingStore::default());

        assert!(h.orchestrator.generate(image(), "Upscale").await.is_err());
        assert_eq!(h.client.call_count(), 5);
    }

    #[tokio::test]
    async fn test_malformed_success_moves_to_next_candidate() {
        let h = harness(
            vec![
                Ok(ApiReply::new(200, r#"{"data":[{"url":"https://example.com/x.png"}]}"#)),
                Ok(ApiReply::new(200, r#"{"data":[]}"#)),
            ],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::default(),
        );

        let err = h.orchestrator.generate(image(), "Upscale").await.unwrap_err();
        assert_eq!(h.client.call_count(), 2);
        assert_eq!(err.to_string(), "No image returned.");
        assert!(h.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_success_reports_parse_error() {
        let h = harness(
            vec![Ok(ApiReply::new(200, "<html>gateway page</html>"))],
            quiet_policy(),
            SizeToken::SQUARE_1024,
            RecordingStore::default(),
        );

        let err = h.orchestrator.generate(image(), "Upscale").await.unwrap_err();
        assert_eq!(h.client.call_count(), 1);
        assert!(matches!(last_failure(&err), Some(GenerateError::InvalidJson { .. })));
        assert!(err.to_string().starts_with("Invalid response from OpenAI: "));
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_plain_network_error_is_terminal_for_candidate() {
        let h = harness(
            vec![
                Err(GenerateError::network("connection refused")),
                Ok(ApiReply::new(200, success_body(b"ok"))),
            ],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::default(),
        );

        h.orchestrator.generate(image(), "Upscale").await.unwrap();
        assert_eq!(h.client.sizes(), vec![SizeToken::Auto, SizeToken::SQUARE_1024]);
        assert!(h.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_retryable_network_error_uses_exponential_delay() {
        let h = harness(
            vec![
                Err(GenerateError::network("HTTP 429 from proxy")),
                Err(GenerateError::network("upstream said retry")),
                Ok(ApiReply::new(200, success_body(b"ok"))),
            ],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::default(),
        );

        h.orchestrator.generate(image(), "Upscale").await.unwrap();
        assert_eq!(
            h.clock.sleeps(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
        assert_eq!(h.client.sizes(), vec![SizeToken::Auto; 3]);
    }

    #[tokio::test]
    async fn test_hinted_retry_still_advances_exponential_counter() {
        let h = harness(
            vec![
                Ok(ApiReply::new(429, "").with_retry_after("1")),
                Err(GenerateError::network("please retry")),
                Ok(ApiReply::new(200, success_body(b"ok"))),
            ],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::default(),
        );

        h.orchestrator.generate(image(), "Upscale").await.unwrap();
        assert_eq!(
            h.clock.sleeps(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_delay_resets_per_candidate() {
        let mut replies: Vec<Result<ApiReply, GenerateError>> =
            (0..5).map(|_| Err(GenerateError::network("retry"))).collect();
        replies.push(Err(GenerateError::network("retry")));
        replies.push(Ok(ApiReply::new(200, success_body(b"ok"))));
        let h = harness(replies, quiet_policy(), SizeToken::Auto, RecordingStore::default());

        h.orchestrator.generate(image(), "Upscale").await.unwrap();
        let ms: Vec<u128> = h.clock.sleeps().iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![1000, 2000, 4000, 8000, 16_000, 1000]);
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let h = harness(
            vec![
                Ok(ApiReply::new(200, success_body(b"a"))),
                Ok(ApiReply::new(200, success_body(b"b"))),
            ],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::failing(),
        );

        let err = h.orchestrator.generate(image(), "Upscale").await.unwrap_err();
        assert!(matches!(last_failure(&err), Some(GenerateError::Persist(_))));
        assert_eq!(h.client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_no_recorded_failure_is_generic() {
        let policy = BackoffPolicy {
            max_attempts: 0,
            ..quiet_policy()
        };
        let h = harness(vec![], policy, SizeToken::Auto, RecordingStore::default());

        let err = h.orchestrator.generate(image(), "Upscale").await.unwrap_err();
        assert_eq!(err.to_string(), "Image generation failed after retries.");
        assert_eq!(h.client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_attempt_events() {
        let h = harness(
            vec![
                Ok(ApiReply::new(500, "")),
                Ok(ApiReply::new(200, success_body(b"ok"))),
            ],
            quiet_policy(),
            SizeToken::Auto,
            RecordingStore::default(),
        );
        let mut rx = h.bus.subscribe();

        h.orchestrator.generate(image(), "Upscale").await.unwrap();
        let attempts: Vec<u32> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                GenerateEvent::AttemptStarted { attempt, .. } => Some(attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2]);
    }
}
