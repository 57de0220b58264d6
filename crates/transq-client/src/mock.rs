//! Mock translation backend for deterministic testing.
//!
//! Translates `text` into `"{target}:{text}"`, so assertions can recompute
//! the expected output of any chunk. Failures, empty output, latency and
//! panics can be scripted per call count or per input substring.
//!
//! ## Usage
//!
//! ```rust
//! use transq_client::mock::MockTranslationClient;
//! use transq_core::TranslationClient;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = MockTranslationClient::new().fail_first(1);
//!
//!     assert!(client.translate("Hello", "en", "zh").await.is_err());
//!     assert_eq!(client.translate("Hello", "en", "zh").await.unwrap(), "zh:Hello");
//!     assert_eq!(client.call_count(), 2);
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use transq_core::{Error, Result, TranslationClient};

/// Mock translation backend for testing.
#[derive(Clone, Default)]
pub struct MockTranslationClient {
    config: Arc<MockConfig>,
    state: Arc<MockState>,
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    latency_ms: u64,
    latency_overrides: Vec<(String, u64)>,
    fail_always: bool,
    fail_first: usize,
    fail_matching: Vec<String>,
    empty_matching: Vec<String>,
    panic_matching: Vec<String>,
    permanent_failures: bool,
}

#[derive(Default)]
struct MockState {
    call_log: Mutex<Vec<MockCall>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// One recorded `translate` invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    pub timestamp: tokio::time::Instant,
}

/// Decrements the in-flight gauge even when the call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTranslationClient {
    /// Create a new mock backend that always succeeds instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set simulated latency for every call.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set latency for inputs containing `needle`, overriding the default.
    pub fn with_latency_for(mut self, needle: impl Into<String>, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config)
            .latency_overrides
            .push((needle.into(), latency_ms));
        self
    }

    /// Fail every call.
    pub fn always_fail(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_always = true;
        self
    }

    /// Fail the first `calls` calls across all inputs, then succeed.
    pub fn fail_first(mut self, calls: usize) -> Self {
        Arc::make_mut(&mut self.config).fail_first = calls;
        self
    }

    /// Fail every call whose input contains `needle`.
    pub fn fail_when_contains(mut self, needle: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .fail_matching
            .push(needle.into());
        self
    }

    /// Answer with an empty string for inputs containing `needle`.
    pub fn empty_when_contains(mut self, needle: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .empty_matching
            .push(needle.into());
        self
    }

    /// Panic inside `translate` for inputs containing `needle`.
    pub fn panic_when_contains(mut self, needle: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .panic_matching
            .push(needle.into());
        self
    }

    /// Report scripted failures as non-retryable configuration errors.
    pub fn with_permanent_failures(mut self) -> Self {
        Arc::make_mut(&mut self.config).permanent_failures = true;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    /// Clear the call log and counters.
    pub fn clear_calls(&self) {
        self.log().clear();
        self.state.calls.store(0, Ordering::SeqCst);
        self.state.peak_in_flight.store(0, Ordering::SeqCst);
    }

    /// Total number of `translate` calls.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Number of calls whose input was exactly `text`.
    pub fn calls_for(&self, text: &str) -> usize {
        self.log().iter().filter(|c| c.text == text).count()
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    /// The deterministic output for `text`.
    pub fn expected(text: &str, target_language: &str) -> String {
        format!("{}:{}", target_language, text)
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.state
            .call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latency_for(&self, text: &str) -> u64 {
        self.config
            .latency_overrides
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, ms)| *ms)
            .unwrap_or(self.config.latency_ms)
    }

    fn should_fail(&self, call_number: usize, text: &str) -> bool {
        self.config.fail_always
            || call_number < self.config.fail_first
            || self
                .config
                .fail_matching
                .iter()
                .any(|needle| text.contains(needle.as_str()))
    }

    fn failure(&self, call_number: usize) -> Error {
        let message = format!("simulated failure on call {}", call_number + 1);
        if self.config.permanent_failures {
            Error::Config(message)
        } else {
            Error::Translation(message)
        }
    }
}

#[async_trait]
impl TranslationClient for MockTranslationClient {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let call_number = self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.log().push(MockCall {
            text: text.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            timestamp: tokio::time::Instant::now(),
        });

        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.state.in_flight);

        let latency = self.latency_for(text);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self
            .config
            .panic_matching
            .iter()
            .any(|needle| text.contains(needle.as_str()))
        {
            panic!("mock translation backend panicked on {:?}", text);
        }

        if self.should_fail(call_number, text) {
            return Err(self.failure(call_number));
        }

        if self
            .config
            .empty_matching
            .iter()
            .any(|needle| text.contains(needle.as_str()))
        {
            return Ok(String::new());
        }

        Ok(Self::expected(text, target_language))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_translates_deterministically() {
        let client = MockTranslationClient::new();
        let first = client.translate("Hello", "en", "zh").await.unwrap();
        let second = client.translate("Hello", "en", "zh").await.unwrap();
        assert_eq!(first, "zh:Hello");
        assert_eq!(first, second);
        assert_eq!(MockTranslationClient::expected("Hello", "zh"), first);
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let client = MockTranslationClient::new();
        client.translate("a", "en", "fr").await.unwrap();
        client.translate("b", "en", "fr").await.unwrap();
        client.translate("a", "en", "fr").await.unwrap();

        assert_eq!(client.call_count(), 3);
        assert_eq!(client.calls_for("a"), 2);
        let calls = client.get_calls();
        assert_eq!(calls[1].text, "b");
        assert_eq!(calls[1].target_language, "fr");

        client.clear_calls();
        assert_eq!(client.call_count(), 0);
        assert!(client.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_fail_first_then_succeed() {
        let client = MockTranslationClient::new().fail_first(2);
        assert!(client.translate("x", "en", "de").await.is_err());
        assert!(client.translate("x", "en", "de").await.is_err());
        assert_eq!(client.translate("x", "en", "de").await.unwrap(), "de:x");
    }

    #[tokio::test]
    async fn test_fail_when_contains() {
        let client = MockTranslationClient::new().fail_when_contains("bad");
        assert!(client.translate("a bad chunk", "en", "de").await.is_err());
        assert!(client.translate("a good chunk", "en", "de").await.is_ok());
    }

    #[tokio::test]
    async fn test_permanent_failures_not_retryable() {
        let client = MockTranslationClient::new()
            .always_fail()
            .with_permanent_failures();
        let err = client.translate("x", "en", "de").await.unwrap_err();
        assert!(!err.is_retryable());

        let client = MockTranslationClient::new().always_fail();
        let err = client.translate("x", "en", "de").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_when_contains() {
        let client = MockTranslationClient::new().empty_when_contains("blank");
        assert_eq!(client.translate("blank", "en", "de").await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_and_peak_concurrency() {
        let client = MockTranslationClient::new()
            .with_latency_ms(100)
            .with_latency_for("slow", 500);

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            client.translate("fast", "en", "de"),
            client.translate("slow", "en", "de")
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(client.peak_concurrency(), 2);
    }

    #[tokio::test]
    #[should_panic(expected = "mock translation backend panicked")]
    async fn test_panic_when_contains() {
        let client = MockTranslationClient::new().panic_when_contains("boom");
        let _ = client.translate("boom", "en", "de").await;
    }
}
