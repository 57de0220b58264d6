//! Error types for transq.

use thiserror::Error;

/// Result type alias using transq's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for transq operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Empty or malformed submission, rejected before queuing
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A single chunk exhausted its retries; always fatal for the job
    #[error("Chunk {index} failed after {attempts} attempt(s): {message}")]
    ChunkTranslation {
        index: usize,
        attempts: u32,
        message: String,
    },

    /// A job stayed `processing` past the stale threshold
    #[error("Job {job_id} timed out after {elapsed_secs}s in processing")]
    JobTimeout { job_id: uuid::Uuid, elapsed_secs: u64 },

    /// Status queried for an unknown or evicted job
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Translation backend answered with an error
    #[error("Translation error: {0}")]
    Translation(String),

    /// A single translation request exceeded its deadline
    #[error("Translation request timed out after {0}ms")]
    RequestTimeout(u64),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether another attempt at the same request can succeed.
    ///
    /// Configuration and input errors are permanent; everything the backend
    /// or the network produced is worth another try.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Config(_) | Error::InvalidInput(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
