//! Caller-facing operations over a runner's store and queue.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use transq_core::{Error, Job, JobSnapshot, QueueStats, Result};

use crate::queue::FifoQueue;
use crate::store::JobStore;
use crate::worker::{sweep_and_notify, RunnerEvent};

/// Submit, inspect and sweep translation jobs.
///
/// Cheap to clone; every clone shares the runner's state.
#[derive(Clone)]
pub struct TranslationService {
    store: JobStore,
    queue: FifoQueue,
    event_tx: broadcast::Sender<RunnerEvent>,
    job_max_retries: u32,
}

impl TranslationService {
    pub fn new(
        store: JobStore,
        queue: FifoQueue,
        event_tx: broadcast::Sender<RunnerEvent>,
        job_max_retries: u32,
    ) -> Self {
        Self {
            store,
            queue,
            event_tx,
            job_max_retries,
        }
    }

    /// Accept a translation job and queue it behind existing work.
    ///
    /// Blank text or an empty language tag is rejected without creating a job.
    #[instrument(
        skip(self, text),
        fields(subsystem = "jobs", component = "service", op = "submit_job", chars = text.chars().count())
    )]
    pub async fn submit_job(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<Uuid> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("text must not be empty".into()));
        }
        let source_language = source_language.trim();
        let target_language = target_language.trim();
        if source_language.is_empty() || target_language.is_empty() {
            return Err(Error::InvalidInput(
                "source and target language must not be empty".into(),
            ));
        }

        let job = Job::new(text, source_language, target_language, self.job_max_retries);
        let job_id = self.store.insert(job).await;
        self.queue.push_back(job_id).await;

        info!(%job_id, "Job queued");
        let _ = self.event_tx.send(RunnerEvent::JobQueued { job_id });
        Ok(job_id)
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> Result<JobSnapshot> {
        self.store.snapshot(job_id).await
    }

    /// Cancel a job that is still waiting in the queue.
    ///
    /// The job is marked `failed` with a cancellation error and returns
    /// `Ok(true)`. A job that already started or finished is left alone and
    /// returns `Ok(false)`; there is no mid-job cancellation.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "service", op = "cancel_job"))]
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<bool> {
        if !self
            .store
            .cancel_pending(job_id, "Job cancelled before processing")
            .await?
        {
            return Ok(false);
        }
        self.queue.remove(job_id).await;

        info!(%job_id, "Job cancelled");
        let _ = self.event_tx.send(RunnerEvent::JobCancelled { job_id });
        Ok(true)
    }

    /// Force every job processing for at least `max_age` to `failed`.
    /// A runner working on a swept job abandons it and moves on.
    pub async fn sweep_stale_jobs(&self, max_age: Duration) -> Vec<Uuid> {
        let swept = sweep_and_notify(&self.store, &self.event_tx, max_age).await;
        debug!(swept = swept.len(), "Stale job sweep finished");
        swept
    }

    /// Per-status counts plus queue depth and the job in flight.
    pub async fn queue_stats(&self) -> QueueStats {
        let mut stats = self.store.stats().await;
        stats.queue_depth = self.queue.len().await;
        stats.current_job = self.queue.current().await;
        stats
    }

    /// Subscribe to runner events.
    pub fn events(&self) -> broadcast::Receiver<RunnerEvent> {
        self.event_tx.subscribe()
    }
}
