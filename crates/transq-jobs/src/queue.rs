//! FIFO queue of job ids awaiting the runner.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Shared FIFO of pending job ids.
///
/// New submissions go to the back; a job requeued after a failure goes to
/// the front so it runs before newer work. Pushing wakes an idle runner.
#[derive(Clone, Default)]
pub struct FifoQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    items: Mutex<VecDeque<Uuid>>,
    current: Mutex<Option<Uuid>>,
    notify: Notify,
}

impl FifoQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a new job behind everything already waiting.
    pub async fn push_back(&self, job_id: Uuid) {
        self.inner.items.lock().await.push_back(job_id);
        self.inner.notify.notify_one();
    }

    /// Enqueue a retried job ahead of everything already waiting.
    pub async fn push_front(&self, job_id: Uuid) {
        self.inner.items.lock().await.push_front(job_id);
        self.inner.notify.notify_one();
    }

    pub async fn pop_front(&self) -> Option<Uuid> {
        self.inner.items.lock().await.pop_front()
    }

    /// Drop a waiting job id. Returns whether it was queued.
    pub async fn remove(&self, job_id: Uuid) -> bool {
        let mut items = self.inner.items.lock().await;
        match items.iter().position(|id| *id == job_id) {
            Some(pos) => items.remove(pos).is_some(),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.items.lock().await.is_empty()
    }

    /// Waiting job ids, oldest first.
    pub async fn pending(&self) -> Vec<Uuid> {
        self.inner.items.lock().await.iter().copied().collect()
    }

    /// Resolves once a push happened since the last wake-up.
    ///
    /// A push made while nobody waits is remembered, so checking the queue
    /// and then waiting never misses work.
    pub async fn notified(&self) {
        self.inner.notify.notified().await;
    }

    /// Job the runner is working on, if any.
    pub async fn current(&self) -> Option<Uuid> {
        *self.inner.current.lock().await
    }

    pub(crate) async fn set_current(&self, job_id: Option<Uuid>) {
        *self.inner.current.lock().await = job_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = FifoQueue::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        for id in &ids {
            queue.push_back(*id).await;
        }

        assert_eq!(queue.len().await, 3);
        assert_eq!(queue.pending().await, ids);
        for id in &ids {
            assert_eq!(queue.pop_front().await, Some(*id));
        }
        assert!(queue.is_empty().await);
        assert_eq!(queue.pop_front().await, None);
    }

    #[tokio::test]
    async fn test_push_front_jumps_the_line() {
        let queue = FifoQueue::new();
        let first = Uuid::now_v7();
        let retried = Uuid::now_v7();
        queue.push_back(first).await;
        queue.push_front(retried).await;

        assert_eq!(queue.pop_front().await, Some(retried));
        assert_eq!(queue.pop_front().await, Some(first));
    }

    #[tokio::test]
    async fn test_remove_keeps_remaining_order() {
        let queue = FifoQueue::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        for id in &ids {
            queue.push_back(*id).await;
        }

        assert!(queue.remove(ids[1]).await);
        assert!(!queue.remove(ids[1]).await);
        assert_eq!(queue.pending().await, vec![ids[0], ids[2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_before_wait_is_not_lost() {
        let queue = FifoQueue::new();
        queue.push_back(Uuid::now_v7()).await;

        tokio::time::timeout(Duration::from_secs(1), queue.notified())
            .await
            .expect("stored wake-up should resolve immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_wait_wakes_on_push() {
        let queue = FifoQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.notified().await })
        };
        tokio::task::yield_now().await;

        queue.push_back(Uuid::now_v7()).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_current_job_tracking() {
        let queue = FifoQueue::new();
        assert_eq!(queue.current().await, None);
        let id = Uuid::now_v7();
        queue.set_current(Some(id)).await;
        assert_eq!(queue.current().await, Some(id));
        queue.set_current(None).await;
        assert_eq!(queue.current().await, None);
    }
}
