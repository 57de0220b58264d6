//! Data model for translation jobs and their chunks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunking::TextSpan;

/// Lifecycle state of a job.
///
/// `Completed` and `Failed` are terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Translation state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

/// A bounded slice of a job's source text, translated independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the job's chunk sequence (ordering key).
    pub index: usize,
    pub text: String,
    /// Byte offset of `text` in the source.
    pub start_offset: usize,
    /// Byte offset one past the end of `text` in the source.
    pub end_offset: usize,
    /// Translation attempts made so far.
    pub retry_count: u32,
    pub status: ChunkStatus,
    pub translation: Option<String>,
}

impl Chunk {
    /// Create a pending chunk from a chunker span.
    pub fn from_span(index: usize, span: TextSpan) -> Self {
        Self {
            index,
            text: span.text,
            start_offset: span.start_offset,
            end_offset: span.end_offset,
            retry_count: 0,
            status: ChunkStatus::Pending,
            translation: None,
        }
    }

    /// The span this chunk was cut from.
    pub fn span(&self) -> TextSpan {
        TextSpan::new(self.text.clone(), self.start_offset, self.end_offset)
    }

    /// Forget attempts and output so a requeued job starts the chunk afresh.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.status = ChunkStatus::Pending;
        self.translation = None;
    }
}

/// One end-to-end text translation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source_text: String,
    pub source_language: String,
    pub target_language: String,
    pub chunks: Vec<Chunk>,
    pub status: JobStatus,
    pub progress: u8,
    pub completed_chunks: usize,
    pub result: Option<String>,
    pub error: Option<String>,
    /// Job-level requeues so far.
    pub retry_count: u32,
    /// Job-level requeue bound.
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job with a time-ordered id.
    pub fn new(
        source_text: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            source_text: source_text.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            chunks: Vec::new(),
            status: JobStatus::Pending,
            progress: 0,
            completed_chunks: 0,
            result: None,
            error: None,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Read-only view handed to callers polling for status.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status,
            progress: self.progress,
            result: self.result.clone(),
            error: self.error.clone(),
            total_chunks: self.total_chunks(),
            completed_chunks: self.completed_chunks,
            retry_count: self.retry_count,
            estimated_seconds_remaining: self.estimate_seconds_remaining(Utc::now()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Average time per completed chunk times the chunks still outstanding.
    ///
    /// Only defined while processing and after at least one chunk finished.
    pub fn estimate_seconds_remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.status != JobStatus::Processing || self.completed_chunks == 0 {
            return None;
        }
        let started_at = self.started_at?;
        let elapsed_ms = (now - started_at).num_milliseconds().max(0) as u64;
        let per_chunk_ms = elapsed_ms / self.completed_chunks as u64;
        let remaining = self.total_chunks().saturating_sub(self.completed_chunks) as u64;
        Some((per_chunk_ms * remaining).div_ceil(1000))
    }
}

/// Caller-visible status of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_seconds_remaining: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    /// Job ids waiting in the FIFO queue.
    pub queue_depth: usize,
    /// Job currently owned by the runner, if any.
    pub current_job: Option<Uuid>,
}
