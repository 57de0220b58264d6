//! Centralized default constants for transq.
//!
//! **This module is the single source of truth** for all shared default values.
//! Configuration types and the CLI reference these constants instead of
//! defining their own magic numbers.
//!
//! Organized by domain area.

use std::time::Duration;

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk sent to the translation backend.
///
/// Sized below the token limit of NLLB-class models.
pub const MAX_CHUNK_SIZE: usize = 600;

// =============================================================================
// BATCH SCHEDULING
// =============================================================================

/// Chunks translated concurrently inside one batch.
pub const BATCH_SIZE: usize = 3;

/// Batches dispatched together as one group.
pub const CONCURRENT_BATCHES: usize = 1;

/// Stagger between chunk dispatches inside a batch, in milliseconds.
pub const CHUNK_DELAY_MS: u64 = 800;

/// Pause between batch groups, in milliseconds.
pub const BATCH_DELAY_MS: u64 = 3000;

// =============================================================================
// CHUNK RETRIES
// =============================================================================

/// Total translation attempts per chunk, including the first.
pub const MAX_RETRIES: u32 = 4;

/// Fixed backoff between chunk attempts, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1500;

/// Per-request timeout for a single chunk translation, in milliseconds.
pub const REQUEST_TIMEOUT_MS: u64 = 45_000;

// =============================================================================
// JOB RUNNER
// =============================================================================

/// Job-level requeues before a job is terminally failed.
pub const JOB_MAX_RETRIES: u32 = 2;

/// Pause between consecutive jobs, in milliseconds.
pub const INTER_JOB_DELAY_MS: u64 = 2000;

/// Age after which a `processing` job is considered stuck (30 minutes).
pub const STALE_JOB_THRESHOLD_SECS: u64 = 30 * 60;

/// Interval of the background stale-job sweep, in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// How long finished jobs stay queryable before eviction (30 minutes).
pub const JOB_RETENTION_SECS: u64 = 30 * 60;

/// Runner event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// PROGRESS
// =============================================================================

/// Progress reported once a job is accepted and chunked.
pub const PROGRESS_SETUP_PERCENT: u8 = 10;

/// Share of the progress bar spent on chunk translation.
pub const PROGRESS_PROCESSING_SPAN: u8 = 90;

/// Highest progress reported before the job is finalized.
pub const PROGRESS_IN_FLIGHT_CAP: u8 = 99;

/// Progress of a completed job.
pub const PROGRESS_COMPLETE: u8 = 100;

// =============================================================================
// TRANSLATION BACKEND
// =============================================================================

/// Default translation endpoint.
pub const TRANSLATION_API_URL: &str = "http://127.0.0.1:8080/api/v4/translator";

/// Connect timeout for the HTTP translation client, in seconds.
pub const TRANSLATION_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Upper bound on generated tokens requested from the backend.
pub const TRANSLATION_MAX_LENGTH: u32 = 1000;

// =============================================================================
// CLI
// =============================================================================

/// Interval at which the CLI polls job status, in milliseconds.
pub const STATUS_POLL_INTERVAL_MS: u64 = 500;

/// Convenience conversion for millisecond constants.
pub const fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
