//! Deployment-wide tuning knobs for chunking, batching and retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Queue configuration, immutable per deployment.
///
/// Serializes to the flat JSON shown by `transq config`; missing keys fall
/// back to their defaults when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum characters per chunk.
    pub max_chunk_size: usize,
    /// Chunks translated concurrently inside one batch.
    pub batch_size: usize,
    /// Batches dispatched together as one group.
    pub concurrent_batches: usize,
    /// Total attempts per chunk, including the first.
    pub max_retries: u32,
    /// Fixed backoff between chunk attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Stagger between chunk dispatches inside a batch in milliseconds.
    pub chunk_delay_ms: u64,
    /// Pause between batch groups in milliseconds.
    pub batch_delay_ms: u64,
    /// Deadline of one translation request in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: defaults::MAX_CHUNK_SIZE,
            batch_size: defaults::BATCH_SIZE,
            concurrent_batches: defaults::CONCURRENT_BATCHES,
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            chunk_delay_ms: defaults::CHUNK_DELAY_MS,
            batch_delay_ms: defaults::BATCH_DELAY_MS,
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or malformed.
pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Read a boolean switch. Only `false` and `0` turn it off.
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| {
            let v = v.trim();
            v != "false" && v != "0"
        })
        .unwrap_or(default)
}

impl QueueConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TRANSQ_MAX_CHUNK_SIZE` | `600` | Max characters per chunk |
    /// | `TRANSQ_BATCH_SIZE` | `3` | Chunks per batch |
    /// | `TRANSQ_CONCURRENT_BATCHES` | `1` | Batches per group |
    /// | `TRANSQ_MAX_RETRIES` | `4` | Attempts per chunk |
    /// | `TRANSQ_RETRY_DELAY_MS` | `1500` | Backoff between attempts |
    /// | `TRANSQ_CHUNK_DELAY_MS` | `800` | Dispatch stagger inside a batch |
    /// | `TRANSQ_BATCH_DELAY_MS` | `3000` | Pause between groups |
    /// | `TRANSQ_REQUEST_TIMEOUT_MS` | `45000` | Per-request deadline |
    pub fn from_env() -> Self {
        Self {
            max_chunk_size: env_or("TRANSQ_MAX_CHUNK_SIZE", defaults::MAX_CHUNK_SIZE),
            batch_size: env_or("TRANSQ_BATCH_SIZE", defaults::BATCH_SIZE).max(1),
            concurrent_batches: env_or("TRANSQ_CONCURRENT_BATCHES", defaults::CONCURRENT_BATCHES)
                .max(1),
            max_retries: env_or("TRANSQ_MAX_RETRIES", defaults::MAX_RETRIES).max(1),
            retry_delay_ms: env_or("TRANSQ_RETRY_DELAY_MS", defaults::RETRY_DELAY_MS),
            chunk_delay_ms: env_or("TRANSQ_CHUNK_DELAY_MS", defaults::CHUNK_DELAY_MS),
            batch_delay_ms: env_or("TRANSQ_BATCH_DELAY_MS", defaults::BATCH_DELAY_MS),
            request_timeout_ms: env_or("TRANSQ_REQUEST_TIMEOUT_MS", defaults::REQUEST_TIMEOUT_MS),
        }
    }

    /// A configuration with every delay set to zero, for tests and demos.
    pub fn without_delays() -> Self {
        Self {
            retry_delay_ms: 0,
            chunk_delay_ms: 0,
            batch_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn with_max_chunk_size(mut self, chars: usize) -> Self {
        self.max_chunk_size = chars;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_concurrent_batches(mut self, batches: usize) -> Self {
        self.concurrent_batches = batches;
        self
    }

    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts;
        self
    }

    pub fn with_retry_delay(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = ms;
        self
    }

    pub fn with_batch_delay(mut self, ms: u64) -> Self {
        self.batch_delay_ms = ms;
        self
    }

    pub fn with_request_timeout(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        defaults::millis(self.retry_delay_ms)
    }

    pub fn chunk_delay(&self) -> Duration {
        defaults::millis(self.chunk_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        defaults::millis(self.batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        defaults::millis(self.request_timeout_ms)
    }

    /// Reject settings under which no job could make progress.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(Error::Config("max_chunk_size must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.concurrent_batches == 0 {
            return Err(Error::Config("concurrent_batches must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag() {
        // Keys are unique to this test so parallel tests never observe them.
        assert!(env_flag("TRANSQ_TEST_FLAG_UNSET", true));
        assert!(!env_flag("TRANSQ_TEST_FLAG_UNSET", false));

        std::env::set_var("TRANSQ_TEST_FLAG_OFF", "false");
        std::env::set_var("TRANSQ_TEST_FLAG_ZERO", " 0 ");
        std::env::set_var("TRANSQ_TEST_FLAG_ON", "yes");
        assert!(!env_flag("TRANSQ_TEST_FLAG_OFF", true));
        assert!(!env_flag("TRANSQ_TEST_FLAG_ZERO", true));
        assert!(env_flag("TRANSQ_TEST_FLAG_ON", false));
    }

    #[test]
    fn test_queue_config_serializes_flat() {
        let value = serde_json::to_value(QueueConfig::default()).unwrap();
        assert_eq!(value["max_chunk_size"], 600);
        assert_eq!(value["batch_size"], 3);
        assert_eq!(value["request_timeout_ms"], 45_000);
    }

    #[test]
    fn test_queue_config_partial_json_uses_defaults() {
        let config: QueueConfig =
            serde_json::from_str(r#"{ "batch_size": 5, "chunk_delay_ms": 0 }"#).unwrap();
        assert_eq!(
            config,
            QueueConfig::default()
                .with_batch_size(5)
                .with_chunk_delay(0)
        );
    }

    #[test]
    fn test_queue_config_default_values() {
        let config = QueueConfig::default();
        assert_eq!(config.max_chunk_size, 600);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.concurrent_batches, 1);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.retry_delay(), Duration::from_millis(1500));
        assert_eq!(config.chunk_delay(), Duration::from_millis(800));
        assert_eq!(config.batch_delay(), Duration::from_secs(3));
        assert_eq!(config.request_timeout(), Duration::from_secs(45));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_config_chaining() {
        let config = QueueConfig::default()
            .with_max_chunk_size(100)
            .with_batch_size(5)
            .with_concurrent_batches(2)
            .with_max_retries(2)
            .with_retry_delay(10)
            .with_chunk_delay(0)
            .with_batch_delay(20)
            .with_request_timeout(1000);

        assert_eq!(config.max_chunk_size, 100);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.concurrent_batches, 2);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_ms, 10);
        assert_eq!(config.chunk_delay_ms, 0);
        assert_eq!(config.batch_delay_ms, 20);
        assert_eq!(config.request_timeout_ms, 1000);
    }

    #[test]
    fn test_without_delays_keeps_sizes() {
        let config = QueueConfig::without_delays();
        assert_eq!(config.retry_delay_ms, 0);
        assert_eq!(config.chunk_delay_ms, 0);
        assert_eq!(config.batch_delay_ms, 0);
        assert_eq!(config.max_chunk_size, QueueConfig::default().max_chunk_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        for config in [
            QueueConfig::default().with_max_chunk_size(0),
            QueueConfig::default().with_batch_size(0),
            QueueConfig::default().with_concurrent_batches(0),
            QueueConfig::default().with_max_retries(0),
            QueueConfig::default().with_request_timeout(0),
        ] {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("TRANSQ_TEST_ENV_OR_GARBAGE", "not-a-number");
        assert_eq!(env_or("TRANSQ_TEST_ENV_OR_GARBAGE", 7usize), 7);
        std::env::set_var("TRANSQ_TEST_ENV_OR_VALUE", " 42 ");
        assert_eq!(env_or("TRANSQ_TEST_ENV_OR_VALUE", 7usize), 42);
        assert_eq!(env_or("TRANSQ_TEST_ENV_OR_UNSET", 9u64), 9);
    }
}
