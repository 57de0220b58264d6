//! Job progress computation and publication.

use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use transq_core::defaults::{
    PROGRESS_IN_FLIGHT_CAP, PROGRESS_PROCESSING_SPAN, PROGRESS_SETUP_PERCENT,
};

use crate::store::JobStore;
use crate::worker::RunnerEvent;

/// Progress of a processing job after `completed` of `total` chunks.
///
/// The first 10% is reserved for acceptance and chunking; translation fills
/// the remaining 90%, capped at 99 until the job is finalized.
pub fn progress_for(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_SETUP_PERCENT;
    }
    let ratio = completed.min(total) as f64 / total as f64;
    let span = (ratio * f64::from(PROGRESS_PROCESSING_SPAN)).round() as u8;
    (PROGRESS_SETUP_PERCENT + span).min(PROGRESS_IN_FLIGHT_CAP)
}

/// Writes progress into the store and announces every effective change.
#[derive(Clone)]
pub struct ProgressTracker {
    store: JobStore,
    event_tx: broadcast::Sender<RunnerEvent>,
}

impl ProgressTracker {
    pub fn new(store: JobStore, event_tx: broadcast::Sender<RunnerEvent>) -> Self {
        Self { store, event_tx }
    }

    /// Mark a freshly claimed job as set up.
    pub async fn start(&self, job_id: Uuid, total_chunks: usize) -> Option<u8> {
        self.publish(job_id, PROGRESS_SETUP_PERCENT, 0, total_chunks)
            .await
    }

    /// Record `completed` of `total` chunks done. Returns the new progress,
    /// or `None` when the store kept a higher value or the job is no longer
    /// processing.
    pub async fn update_progress(&self, job_id: Uuid, completed: usize, total: usize) -> Option<u8> {
        self.publish(job_id, progress_for(completed, total), completed, total)
            .await
    }

    async fn publish(&self, job_id: Uuid, progress: u8, completed: usize, total: usize) -> Option<u8> {
        if !self.store.record_progress(job_id, progress, completed).await {
            return None;
        }

        trace!(%job_id, progress, completed, total, "Progress updated");
        let _ = self.event_tx.send(RunnerEvent::JobProgress {
            job_id,
            progress,
            completed_chunks: completed,
            total_chunks: total,
        });
        Some(progress)
    }
}
