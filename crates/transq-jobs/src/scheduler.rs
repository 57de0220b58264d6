//! Batch scheduling of a job's chunks against the translation backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tokio::time::sleep;
use tracing::{debug, instrument};

use transq_core::{Chunk, Error, Job, QueueConfig, Result, TranslationClient};

use crate::progress::ProgressTracker;
use crate::retry::{RetryExecutor, RetryPolicy};

/// Translates a job's chunks in batches.
///
/// Consecutive chunks form batches of `batch_size`; `concurrent_batches`
/// consecutive batches form a group. A group runs concurrently, chunk
/// dispatches inside a batch are staggered by `chunk_delay`, and groups are
/// separated by `batch_delay`. The first chunk that exhausts its retries
/// fails the whole job and cancels the rest of its group.
pub struct BatchScheduler {
    executor: RetryExecutor,
    config: QueueConfig,
    progress: Option<ProgressTracker>,
}

impl BatchScheduler {
    pub fn new(client: Arc<dyn TranslationClient>, config: QueueConfig) -> Self {
        let executor = RetryExecutor::new(client, RetryPolicy::from_config(&config));
        Self {
            executor,
            config,
            progress: None,
        }
    }

    /// Publish progress after every finished batch.
    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Translate every chunk of `job`, returning translations in chunk order.
    #[instrument(
        skip(self, job),
        fields(
            subsystem = "jobs",
            component = "scheduler",
            op = "process_job",
            job_id = %job.id,
            chunks = job.chunks.len()
        )
    )]
    pub async fn process_job(&self, job: &mut Job) -> Result<Vec<String>> {
        let total = job.chunks.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let job_id = job.id;
        let batch_size = self.config.batch_size.max(1);
        let group_size = batch_size * self.config.concurrent_batches.max(1);
        let source_language = job.source_language.clone();
        let target_language = job.target_language.clone();
        let (source, target) = (source_language.as_str(), target_language.as_str());

        let completed = AtomicUsize::new(0);
        let completed = &completed;
        let progress = self.progress.as_ref();
        let mut translated: Vec<(usize, String)> = Vec::with_capacity(total);

        for (group_index, group) in job.chunks.chunks_mut(group_size).enumerate() {
            if group_index > 0 && !self.config.batch_delay().is_zero() {
                sleep(self.config.batch_delay()).await;
            }

            let batches = group.chunks_mut(batch_size).map(|batch| async move {
                let size = batch.len();
                let started = Instant::now();
                let out = self.run_batch(batch, source, target).await?;

                let done = completed.fetch_add(size, Ordering::SeqCst) + size;
                debug!(
                    batch_chunks = size,
                    completed = done,
                    total,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Batch finished"
                );
                if let Some(tracker) = progress {
                    tracker.update_progress(job_id, done, total).await;
                }
                Ok::<_, Error>(out)
            });

            let results = try_join_all(batches).await?;
            translated.extend(results.into_iter().flatten());
        }
        job.completed_chunks = completed.load(Ordering::SeqCst);

        translated.sort_by_key(|(index, _)| *index);
        if translated.len() != total {
            return Err(Error::Internal(format!(
                "{} of {} chunks translated",
                translated.len(),
                total
            )));
        }
        Ok(translated.into_iter().map(|(_, text)| text).collect())
    }

    async fn run_batch(
        &self,
        batch: &mut [Chunk],
        source: &str,
        target: &str,
    ) -> Result<Vec<(usize, String)>> {
        let chunk_delay = self.config.chunk_delay();
        let dispatches = batch.iter_mut().enumerate().map(|(k, chunk)| async move {
            let stagger = chunk_delay * k as u32;
            if !stagger.is_zero() {
                sleep(stagger).await;
            }
            let index = chunk.index;
            self.executor
                .translate_with_retry(chunk, source, target)
                .await
                .map(|translation| (index, translation))
        });
        try_join_all(dispatches).await
    }
}
