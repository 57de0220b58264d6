//! # transq-jobs
//!
//! Chunked translation job processing for transq.
//!
//! This crate provides:
//! - An in-memory job store and FIFO queue
//! - A retry executor bounding every chunk translation
//! - A batch scheduler translating chunks concurrently in index order
//! - Progress tracking and notifications via broadcast channels
//! - A single-flight runner with bounded front-of-queue job retries
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use transq_client::MockTranslationClient;
//! use transq_jobs::{JobStatus, QueueConfig, RunnerBuilder, RunnerConfig};
//!
//! #[tokio::main]
//! async fn main() -> transq_jobs::Result<()> {
//!     let runner = RunnerBuilder::new(Arc::new(MockTranslationClient::new()))
//!         .with_queue_config(QueueConfig::without_delays())
//!         .with_runner_config(RunnerConfig::default().with_inter_job_delay(0))
//!         .build()?;
//!
//!     let service = runner.service();
//!     let handle = runner.start();
//!
//!     let job_id = service.submit_job("Hello. World!", "en", "zh").await?;
//!     loop {
//!         let status = service.get_job_status(job_id).await?;
//!         if status.status == JobStatus::Completed {
//!             assert_eq!(status.result.as_deref(), Some("zh:Hello. World!"));
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     }
//!
//!     handle.shutdown().await
//! }
//! ```

pub mod progress;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod worker;

// Re-export core types
pub use transq_core::*;

pub use progress::{progress_for, ProgressTracker};
pub use queue::FifoQueue;
pub use retry::{RetryExecutor, RetryPolicy};
pub use scheduler::BatchScheduler;
pub use service::TranslationService;
pub use store::JobStore;
pub use worker::{JobRunner, RunnerBuilder, RunnerConfig, RunnerEvent, RunnerHandle};
