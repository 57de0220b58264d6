//! Bounded, timed retries around a single chunk translation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, trace, warn};

use transq_core::{Chunk, ChunkStatus, Error, QueueConfig, Result, TranslationClient};

/// How one chunk dispatch is retried. Shared by every dispatch of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
    /// Deadline of each attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            timeout,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_delay(),
            config.request_timeout(),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Runs chunk translations under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryExecutor {
    client: Arc<dyn TranslationClient>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(client: Arc<dyn TranslationClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Translate `chunk`, retrying failed attempts after the policy delay.
    ///
    /// Timeouts and blank output count as failed attempts. Errors that are
    /// not retryable end the loop early. On exhaustion the error names the
    /// chunk index and carries the last underlying failure.
    #[instrument(
        skip(self, chunk),
        fields(
            subsystem = "jobs",
            component = "retry",
            op = "translate_chunk",
            chunk_index = chunk.index
        )
    )]
    pub async fn translate_with_retry(
        &self,
        chunk: &mut Chunk,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        chunk.status = ChunkStatus::Processing;

        let mut attempt = 0;
        loop {
            attempt += 1;
            chunk.retry_count += 1;

            let error = match self
                .attempt(&chunk.text, source_language, target_language)
                .await
            {
                Ok(translation) => {
                    trace!(attempt, chars = translation.chars().count(), "Chunk translated");
                    chunk.status = ChunkStatus::Done;
                    chunk.translation = Some(translation.clone());
                    return Ok(translation);
                }
                Err(e) => e,
            };

            if attempt >= self.policy.max_attempts || !error.is_retryable() {
                warn!(attempt, error = %error, "Chunk translation gave up");
                chunk.status = ChunkStatus::Failed;
                return Err(Error::ChunkTranslation {
                    index: chunk.index,
                    attempts: attempt,
                    message: error.to_string(),
                });
            }

            debug!(
                attempt,
                max_attempts = self.policy.max_attempts,
                error = %error,
                "Chunk translation failed, retrying"
            );
            if !self.policy.delay.is_zero() {
                sleep(self.policy.delay).await;
            }
        }
    }

    async fn attempt(&self, text: &str, source_language: &str, target_language: &str) -> Result<String> {
        let call = self.client.translate(text, source_language, target_language);
        match timeout(self.policy.timeout, call).await {
            Ok(Ok(translation)) if translation.trim().is_empty() => Err(Error::Translation(
                format!("{} backend returned an empty translation", self.client.name()),
            )),
            Ok(result) => result,
            Err(_) => Err(Error::RequestTimeout(self.policy.timeout.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transq_client::MockTranslationClient;
    use transq_core::TextSpan;

    fn chunk(text: &str) -> Chunk {
        Chunk::from_span(5, TextSpan::new(text.to_string(), 0, text.len()))
    }

    fn executor(client: &MockTranslationClient, max_attempts: u32) -> RetryExecutor {
        let policy = RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1500),
            Duration::from_millis(45_000),
        );
        RetryExecutor::new(Arc::new(client.clone()), policy)
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&QueueConfig::default());
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay, Duration::from_millis(1500));
        assert_eq!(policy.timeout, Duration::from_secs(45));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let client = MockTranslationClient::new();
        let mut chunk = chunk("Hello.");

        let out = executor(&client, 4)
            .translate_with_retry(&mut chunk, "en", "zh")
            .await
            .unwrap();
        assert_eq!(out, "zh:Hello.");
        assert_eq!(chunk.retry_count, 1);
        assert_eq!(chunk.status, ChunkStatus::Done);
        assert_eq!(chunk.translation.as_deref(), Some("zh:Hello."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_fixed_delay() {
        let client = MockTranslationClient::new().fail_first(2);
        let mut chunk = chunk("Hello.");
        let start = tokio::time::Instant::now();

        let out = executor(&client, 4)
            .translate_with_retry(&mut chunk, "en", "zh")
            .await
            .unwrap();
        assert_eq!(out, "zh:Hello.");
        assert_eq!(chunk.retry_count, 3);
        assert_eq!(client.call_count(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_names_chunk_index() {
        let client = MockTranslationClient::new().always_fail();
        let mut chunk = chunk("Hello.");

        let err = executor(&client, 4)
            .translate_with_retry(&mut chunk, "en", "zh")
            .await
            .unwrap_err();
        match err {
            Error::ChunkTranslation {
                index,
                attempts,
                ref message,
            } => {
                assert_eq!(index, 5);
                assert_eq!(attempts, 4);
                assert!(message.contains("simulated failure"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("Chunk 5 failed after 4 attempt(s)"));
        assert_eq!(client.call_count(), 4);
        assert_eq!(chunk.status, ChunkStatus::Failed);
        assert!(chunk.translation.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let client = MockTranslationClient::new().with_latency_ms(60_000);
        let mut chunk = chunk("slow");

        let err = executor(&client, 2)
            .translate_with_retry(&mut chunk, "en", "zh")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out after 45000ms"));
        assert_eq!(chunk.retry_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_translation_is_a_failure() {
        let client = MockTranslationClient::new().empty_when_contains("blank");
        let mut chunk = chunk("blank");

        let err = executor(&client, 3)
            .translate_with_retry(&mut chunk, "en", "zh")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty translation"));
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_stops_early() {
        let client = MockTranslationClient::new()
            .always_fail()
            .with_permanent_failures();
        let mut chunk = chunk("Hello.");

        let err = executor(&client, 4)
            .translate_with_retry(&mut chunk, "en", "zh")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChunkTranslation { attempts: 1, .. }));
        assert_eq!(client.call_count(), 1);
    }
}
