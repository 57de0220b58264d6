//! In-memory job store, the single source of truth for job state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use transq_core::defaults::PROGRESS_COMPLETE;
use transq_core::{Chunk, ChunkStatus, Error, Job, JobSnapshot, JobStatus, QueueStats, Result};

/// Shared handle over the job map.
///
/// Every transition goes through this type. `complete`, `fail`, `requeue`
/// and `record_progress` only touch jobs that are `processing`; they return
/// `false` when the job already left that state, which keeps `completed` and
/// `failed` absorbing.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    /// Signalled whenever a job leaves `processing`.
    released: Arc<Notify>,
}

/// Elapsed wall-clock time since `since`, zero if `since` lies in the future.
fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) -> Uuid {
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        id
    }

    pub async fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    pub async fn snapshot(&self, job_id: Uuid) -> Result<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(Job::snapshot)
            .ok_or(Error::JobNotFound(job_id))
    }

    pub async fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.jobs.read().await.get(&job_id).map(|job| job.status)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Move a pending job to `processing` and hand the runner a working copy.
    pub async fn claim(&self, job_id: Uuid) -> Option<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id)?;
        if job.status != JobStatus::Pending {
            debug!(%job_id, status = %job.status, "Skipping claim of non-pending job");
            return None;
        }

        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        job.updated_at = now;
        Some(job.clone())
    }

    pub async fn set_chunks(&self, job_id: Uuid, chunks: Vec<Chunk>) -> bool {
        self.update_processing(job_id, |job| {
            job.chunks = chunks;
            job.completed_chunks = 0;
        })
        .await
    }

    /// Write back per-chunk status, attempts and translations after a run.
    /// Chunks left `processing` by a cancelled batch go back to `pending`.
    pub async fn record_chunks(&self, job_id: Uuid, mut chunks: Vec<Chunk>) -> bool {
        for chunk in chunks
            .iter_mut()
            .filter(|c| c.status == ChunkStatus::Processing)
        {
            chunk.status = ChunkStatus::Pending;
        }
        self.update_processing(job_id, |job| job.chunks = chunks)
            .await
    }

    /// Raise progress to `progress`. Lower values are ignored so successive
    /// reads never go backwards. Returns whether progress changed.
    pub async fn record_progress(&self, job_id: Uuid, progress: u8, completed_chunks: usize) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            return false;
        };
        if job.status != JobStatus::Processing {
            return false;
        }

        job.completed_chunks = job.completed_chunks.max(completed_chunks);
        if progress <= job.progress {
            return false;
        }
        job.progress = progress;
        job.updated_at = Utc::now();
        true
    }

    pub async fn complete(&self, job_id: Uuid, result: String) -> bool {
        let done = self
            .update_processing(job_id, |job| {
                let now = Utc::now();
                job.status = JobStatus::Completed;
                job.progress = PROGRESS_COMPLETE;
                job.completed_chunks = job.total_chunks();
                job.result = Some(result);
                job.error = None;
                job.completed_at = Some(now);
            })
            .await;
        if done {
            self.released.notify_waiters();
        }
        done
    }

    /// Return a failed job to `pending` for another run. Chunk boundaries
    /// are kept; attempts and partial output are discarded.
    pub async fn requeue(&self, job_id: Uuid) -> bool {
        let done = self
            .update_processing(job_id, |job| {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.started_at = None;
                job.completed_chunks = 0;
                job.chunks.iter_mut().for_each(Chunk::reset);
            })
            .await;
        if done {
            self.released.notify_waiters();
        }
        done
    }

    pub async fn fail(&self, job_id: Uuid, error: impl Into<String>) -> bool {
        let error = error.into();
        let done = self
            .update_processing(job_id, |job| {
                job.status = JobStatus::Failed;
                job.result = None;
                job.error = Some(error);
                job.completed_at = Some(Utc::now());
            })
            .await;
        if done {
            self.released.notify_waiters();
        }
        done
    }

    /// Fail a job that has not started yet. Jobs in any other state are left
    /// untouched and `Ok(false)` is returned.
    pub async fn cancel_pending(&self, job_id: Uuid, reason: impl Into<String>) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if job.status != JobStatus::Pending {
            debug!(%job_id, status = %job.status, "Not cancelling job that left pending");
            return Ok(false);
        }

        let now = Utc::now();
        job.status = JobStatus::Failed;
        job.error = Some(reason.into());
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    /// Force jobs processing for at least `max_age` to `failed`.
    pub async fn sweep_stale(&self, max_age: Duration) -> Vec<Uuid> {
        let now = Utc::now();
        let mut swept = Vec::new();

        {
            let mut jobs = self.jobs.write().await;
            for job in jobs.values_mut() {
                if job.status != JobStatus::Processing {
                    continue;
                }
                let elapsed = elapsed_since(job.started_at.unwrap_or(job.updated_at), now);
                if elapsed < max_age {
                    continue;
                }

                let error = Error::JobTimeout {
                    job_id: job.id,
                    elapsed_secs: elapsed.as_secs(),
                };
                warn!(job_id = %job.id, elapsed_secs = elapsed.as_secs(), "Sweeping stale job");
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.completed_at = Some(now);
                job.updated_at = now;
                swept.push(job.id);
            }
        }

        if !swept.is_empty() {
            self.released.notify_waiters();
        }
        swept
    }

    /// Drop finished jobs whose completion is at least `max_age` old.
    pub async fn evict_finished(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match (job.status.is_terminal(), job.completed_at) {
            (true, Some(completed_at)) => elapsed_since(completed_at, now) < max_age,
            _ => true,
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted, "Evicted finished jobs");
        }
        evicted
    }

    /// Resolve once `job_id` is no longer `processing` (or no longer exists).
    pub async fn wait_until_released(&self, job_id: Uuid) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.status(job_id).await != Some(JobStatus::Processing) {
                return;
            }
            notified.await;
        }
    }

    /// Per-status counts. Queue fields are filled in by the caller.
    pub async fn stats(&self) -> QueueStats {
        let jobs = self.jobs.read().await;
        let mut stats = QueueStats {
            total: jobs.len(),
            ..QueueStats::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    async fn update_processing(&self, job_id: Uuid, apply: impl FnOnce(&mut Job)) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processing => {
                apply(job);
                job.updated_at = Utc::now();
                true
            }
            Some(job) => {
                debug!(%job_id, status = %job.status, "Ignoring update to job that is not processing");
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transq_core::TextSpan;

    async fn store_with_job() -> (JobStore, Uuid) {
        let store = JobStore::new();
        let id = store.insert(Job::new("Hello. World!", "en", "zh", 2)).await;
        (store, id)
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::from_span(0, TextSpan::new("Hello.".into(), 0, 6)),
            Chunk::from_span(1, TextSpan::new("World!".into(), 7, 13)),
        ]
    }

    #[tokio::test]
    async fn test_insert_and_snapshot() {
        let (store, id) = store_with_job().await;
        assert_eq!(store.len().await, 1);

        let snapshot = store.snapshot(id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.progress, 0);

        let missing = Uuid::now_v7();
        assert!(matches!(
            store.snapshot(missing).await,
            Err(Error::JobNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_claim_only_pending() {
        let (store, id) = store_with_job().await;
        let job = store.claim(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());
        assert!(store.claim(id).await.is_none());
    }

    #[tokio::test]
    async fn test_progress_is_floored() {
        let (store, id) = store_with_job().await;
        store.claim(id).await.unwrap();
        store.set_chunks(id, chunks()).await;

        assert!(store.record_progress(id, 10, 0).await);
        assert!(store.record_progress(id, 55, 1).await);
        assert!(!store.record_progress(id, 40, 1).await);
        assert!(!store.record_progress(id, 55, 1).await);

        let snapshot = store.snapshot(id).await.unwrap();
        assert_eq!(snapshot.progress, 55);
        assert_eq!(snapshot.completed_chunks, 1);
        assert_eq!(snapshot.total_chunks, 2);
    }

    #[tokio::test]
    async fn test_complete_sets_result_and_full_progress() {
        let (store, id) = store_with_job().await;
        store.claim(id).await.unwrap();
        store.set_chunks(id, chunks()).await;
        assert!(store.complete(id, "done".into()).await);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.completed_chunks, 2);
        assert_eq!(job.result.as_deref(), Some("done"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_states_are_absorbing() {
        let (store, id) = store_with_job().await;
        store.claim(id).await.unwrap();
        assert!(store.fail(id, "boom").await);

        assert!(!store.complete(id, "late".into()).await);
        assert!(!store.record_progress(id, 90, 1).await);
        assert!(!store.requeue(id).await);
        assert!(!store.fail(id, "again").await);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_requeue_resets_chunks_keeps_progress() {
        let (store, id) = store_with_job().await;
        store.claim(id).await.unwrap();
        let mut worked = chunks();
        worked[0].retry_count = 3;
        worked[0].translation = Some("x".into());
        store.set_chunks(id, worked).await;
        store.record_progress(id, 55, 1).await;

        assert!(store.requeue(id).await);
        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.progress, 55);
        assert_eq!(job.completed_chunks, 0);
        assert_eq!(job.chunks.len(), 2);
        assert_eq!(job.chunks[0].retry_count, 0);
        assert!(job.chunks[0].translation.is_none());
        assert!(job.started_at.is_none());
    }

    #[tokio::test]
    async fn test_record_chunks_keeps_attempts_and_outcome() {
        let (store, id) = store_with_job().await;
        store.claim(id).await.unwrap();
        store.set_chunks(id, chunks()).await;

        let mut worked = chunks();
        worked[0].retry_count = 3;
        worked[0].status = ChunkStatus::Done;
        worked[0].translation = Some("zh:Hello.".into());
        worked[1].retry_count = 1;
        worked[1].status = ChunkStatus::Processing;
        assert!(store.record_chunks(id, worked).await);
        assert!(store.fail(id, "chunk 1 cancelled").await);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.chunks[0].retry_count, 3);
        assert_eq!(job.chunks[0].status, ChunkStatus::Done);
        assert_eq!(job.chunks[0].translation.as_deref(), Some("zh:Hello."));
        assert_eq!(job.chunks[1].retry_count, 1);
        assert_eq!(job.chunks[1].status, ChunkStatus::Pending);

        // Terminal jobs are not rewritten
        assert!(!store.record_chunks(id, chunks()).await);
        assert_eq!(store.get(id).await.unwrap().chunks[0].retry_count, 3);
    }

    #[tokio::test]
    async fn test_cancel_pending_only() {
        let store = JobStore::new();
        let pending = store.insert(Job::new("a", "en", "zh", 2)).await;
        let running = store.insert(Job::new("b", "en", "zh", 2)).await;
        store.claim(running).await.unwrap();

        assert!(store.cancel_pending(pending, "cancelled").await.unwrap());
        let job = store.get(pending).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("cancelled"));
        assert!(job.completed_at.is_some());

        assert!(!store.cancel_pending(pending, "again").await.unwrap());
        assert!(!store.cancel_pending(running, "cancelled").await.unwrap());
        assert_eq!(store.status(running).await, Some(JobStatus::Processing));
        assert!(store.claim(pending).await.is_none());

        let missing = Uuid::new_v4();
        assert!(matches!(
            store.cancel_pending(missing, "x").await,
            Err(Error::JobNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_sweep_fails_only_stale_processing_jobs() {
        let store = JobStore::new();
        let stale = store.insert(Job::new("a", "en", "zh", 2)).await;
        let waiting = store.insert(Job::new("b", "en", "zh", 2)).await;
        store.claim(stale).await.unwrap();

        assert!(store.sweep_stale(Duration::from_secs(3600)).await.is_empty());

        let swept = store.sweep_stale(Duration::ZERO).await;
        assert_eq!(swept, vec![stale]);

        let job = store.get(stale).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("timed out"));
        assert_eq!(store.status(waiting).await, Some(JobStatus::Pending));
    }

    #[tokio::test]
    async fn test_evict_finished() {
        let (store, id) = store_with_job().await;
        let pending = store.insert(Job::new("b", "en", "zh", 2)).await;
        store.claim(id).await.unwrap();
        store.complete(id, "done".into()).await;

        assert_eq!(store.evict_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.evict_finished(Duration::ZERO).await, 1);
        assert!(store.get(id).await.is_none());
        assert!(store.get(pending).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_released() {
        let (store, id) = store_with_job().await;
        store.claim(id).await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_until_released(id).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        store.sweep_stale(Duration::ZERO).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("sweep should release the waiter")
            .unwrap();

        // Already released jobs resolve immediately.
        store.wait_until_released(id).await;
        store.wait_until_released(Uuid::now_v7()).await;
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let store = JobStore::new();
        let a = store.insert(Job::new("a", "en", "zh", 2)).await;
        let b = store.insert(Job::new("b", "en", "zh", 2)).await;
        store.insert(Job::new("c", "en", "zh", 2)).await;
        store.claim(a).await.unwrap();
        store.claim(b).await.unwrap();
        store.fail(b, "x").await;

        let stats = store.stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }
}
