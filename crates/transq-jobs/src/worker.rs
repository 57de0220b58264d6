//! Single-flight FIFO runner for translation jobs.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use transq_core::config::{env_flag, env_or};
use transq_core::{
    defaults, join_translated, BoundaryChunker, Chunk, Chunker, Error, Job, QueueConfig, Result,
    TranslationClient,
};

use crate::progress::ProgressTracker;
use crate::queue::FifoQueue;
use crate::scheduler::BatchScheduler;
use crate::service::TranslationService;
use crate::store::JobStore;

/// Configuration for the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Job-level requeues before a job is terminally failed.
    pub job_max_retries: u32,
    /// Pause between consecutive jobs in milliseconds.
    pub inter_job_delay_ms: u64,
    /// Processing age after which the background sweep fails a job.
    pub stale_job_threshold_secs: u64,
    /// Background sweep interval in seconds; zero disables the sweep task.
    pub sweep_interval_secs: u64,
    /// Retention of finished jobs in seconds.
    pub job_retention_secs: u64,
    /// Whether to process jobs at all.
    pub enabled: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            job_max_retries: defaults::JOB_MAX_RETRIES,
            inter_job_delay_ms: defaults::INTER_JOB_DELAY_MS,
            stale_job_threshold_secs: defaults::STALE_JOB_THRESHOLD_SECS,
            sweep_interval_secs: defaults::SWEEP_INTERVAL_SECS,
            job_retention_secs: defaults::JOB_RETENTION_SECS,
            enabled: true,
        }
    }
}

impl RunnerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TRANSQ_RUNNER_ENABLED` | `true` | Enable/disable job processing |
    /// | `TRANSQ_JOB_MAX_RETRIES` | `2` | Job-level requeues |
    /// | `TRANSQ_INTER_JOB_DELAY_MS` | `2000` | Pause between jobs |
    /// | `TRANSQ_STALE_JOB_SECS` | `1800` | Stale processing threshold |
    /// | `TRANSQ_SWEEP_INTERVAL_SECS` | `60` | Background sweep interval (0 = off) |
    /// | `TRANSQ_JOB_RETENTION_SECS` | `1800` | Finished job retention |
    pub fn from_env() -> Self {
        Self {
            job_max_retries: env_or("TRANSQ_JOB_MAX_RETRIES", defaults::JOB_MAX_RETRIES),
            inter_job_delay_ms: env_or("TRANSQ_INTER_JOB_DELAY_MS", defaults::INTER_JOB_DELAY_MS),
            stale_job_threshold_secs: env_or(
                "TRANSQ_STALE_JOB_SECS",
                defaults::STALE_JOB_THRESHOLD_SECS,
            ),
            sweep_interval_secs: env_or("TRANSQ_SWEEP_INTERVAL_SECS", defaults::SWEEP_INTERVAL_SECS),
            job_retention_secs: env_or("TRANSQ_JOB_RETENTION_SECS", defaults::JOB_RETENTION_SECS),
            enabled: env_flag("TRANSQ_RUNNER_ENABLED", true),
        }
    }

    pub fn with_job_max_retries(mut self, retries: u32) -> Self {
        self.job_max_retries = retries;
        self
    }

    pub fn with_inter_job_delay(mut self, ms: u64) -> Self {
        self.inter_job_delay_ms = ms;
        self
    }

    pub fn with_stale_job_threshold(mut self, secs: u64) -> Self {
        self.stale_job_threshold_secs = secs;
        self
    }

    pub fn with_sweep_interval(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    pub fn with_job_retention(mut self, secs: u64) -> Self {
        self.job_retention_secs = secs;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn inter_job_delay(&self) -> Duration {
        defaults::millis(self.inter_job_delay_ms)
    }

    pub fn stale_job_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_job_threshold_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }
}

/// Event emitted by the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// A job was accepted and queued.
    JobQueued { job_id: Uuid },
    /// A job was claimed; `attempt` counts from 1.
    JobStarted { job_id: Uuid, attempt: u32 },
    /// Job progress advanced.
    JobProgress {
        job_id: Uuid,
        progress: u8,
        completed_chunks: usize,
        total_chunks: usize,
    },
    /// A failed job went back to the front of the queue.
    JobRequeued {
        job_id: Uuid,
        retry_count: u32,
        error: String,
    },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, duration_ms: u64 },
    /// A job failed terminally.
    JobFailed { job_id: Uuid, error: String },
    /// A job was cancelled before it started.
    JobCancelled { job_id: Uuid },
    /// Stale jobs were forced to `failed`.
    JobsSwept { job_ids: Vec<Uuid> },
    /// Runner started.
    RunnerStarted,
    /// Runner stopped.
    RunnerStopped,
}

/// Handle for controlling a running runner.
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<RunnerEvent>,
}

impl RunnerHandle {
    /// Signal the runner to shut down.
    ///
    /// The signal is observed between jobs: a job in flight runs to its
    /// outcome first, and anything still queued stays `pending`.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for runner events.
    pub fn events(&self) -> broadcast::Receiver<RunnerEvent> {
        self.event_rx.resubscribe()
    }
}

/// How one run of a job ended.
enum Outcome {
    Translated(Job, Vec<String>),
    /// The worked job comes back unless the task panicked or was cancelled.
    Failed(Option<Job>, String),
    /// The job left `processing` underneath the runner (swept).
    Released,
}

/// Sweep stale jobs and announce them.
pub(crate) async fn sweep_and_notify(
    store: &JobStore,
    event_tx: &broadcast::Sender<RunnerEvent>,
    max_age: Duration,
) -> Vec<Uuid> {
    let job_ids = store.sweep_stale(max_age).await;
    if !job_ids.is_empty() {
        warn!(count = job_ids.len(), "Stale jobs forced to failed");
        for job_id in &job_ids {
            let error = store
                .get(*job_id)
                .await
                .and_then(|job| job.error)
                .unwrap_or_default();
            let _ = event_tx.send(RunnerEvent::JobFailed {
                job_id: *job_id,
                error,
            });
        }
        let _ = event_tx.send(RunnerEvent::JobsSwept {
            job_ids: job_ids.clone(),
        });
    }
    job_ids
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Runner that takes jobs off the FIFO queue one at a time.
pub struct JobRunner {
    store: JobStore,
    queue: FifoQueue,
    scheduler: Arc<BatchScheduler>,
    chunker: Arc<dyn Chunker>,
    config: RunnerConfig,
    event_tx: broadcast::Sender<RunnerEvent>,
    progress: ProgressTracker,
}

impl JobRunner {
    /// Create a new runner over `store` and `queue`.
    pub fn new(
        client: Arc<dyn TranslationClient>,
        queue_config: QueueConfig,
        config: RunnerConfig,
        store: JobStore,
        queue: FifoQueue,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let progress = ProgressTracker::new(store.clone(), event_tx.clone());
        let chunker: Arc<dyn Chunker> = Arc::new(BoundaryChunker::from_config(&queue_config));
        let scheduler =
            Arc::new(BatchScheduler::new(client, queue_config).with_progress(progress.clone()));

        Self {
            store,
            queue,
            scheduler,
            chunker,
            config,
            event_tx,
            progress,
        }
    }

    /// Caller-facing facade sharing this runner's store and queue.
    pub fn service(&self) -> TranslationService {
        TranslationService::new(
            self.store.clone(),
            self.queue.clone(),
            self.event_tx.clone(),
            self.config.job_max_retries,
        )
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Get a receiver for runner events.
    pub fn events(&self) -> broadcast::Receiver<RunnerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the runner (and the sweep task) and return a handle for control.
    pub fn start(self) -> RunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let runner = Arc::new(self);
        tokio::spawn(async move {
            let sweeper = runner.spawn_sweeper();
            runner.run(&mut shutdown_rx).await;
            if let Some(sweeper) = sweeper {
                sweeper.abort();
            }
        });

        RunnerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the dequeue loop until shutdown.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "runner"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job runner is disabled, not starting");
            return;
        }

        info!(
            job_max_retries = self.config.job_max_retries,
            inter_job_delay_ms = self.config.inter_job_delay_ms,
            "Job runner started"
        );
        let _ = self.event_tx.send(RunnerEvent::RunnerStarted);

        let inter_job_delay = self.config.inter_job_delay();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job runner received shutdown signal");
                break;
            }

            let Some(job_id) = self.queue.pop_front().await else {
                // Queue empty - idle until a submission or shutdown
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job runner received shutdown signal");
                        break;
                    }
                    _ = self.queue.notified() => continue,
                }
            };

            self.process(job_id).await;

            if !inter_job_delay.is_zero() && !self.queue.is_empty().await {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job runner received shutdown signal");
                        break;
                    }
                    _ = sleep(inter_job_delay) => {}
                }
            }
        }

        let _ = self.event_tx.send(RunnerEvent::RunnerStopped);
        info!("Job runner stopped");
    }

    /// Claim, translate and finalize one job.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "runner", op = "process"))]
    async fn process(&self, job_id: Uuid) {
        let Some(mut job) = self.store.claim(job_id).await else {
            return;
        };
        let start = Instant::now();
        let attempt = job.retry_count + 1;
        self.queue.set_current(Some(job_id)).await;

        if job.chunks.is_empty() {
            job.chunks = self
                .chunker
                .chunk(&job.source_text)
                .into_iter()
                .enumerate()
                .map(|(index, span)| Chunk::from_span(index, span))
                .collect();
        }
        let total_chunks = job.total_chunks();
        self.store.set_chunks(job_id, job.chunks.clone()).await;

        info!(%job_id, attempt, total_chunks, "Processing job");
        let _ = self
            .event_tx
            .send(RunnerEvent::JobStarted { job_id, attempt });
        self.progress.start(job_id, total_chunks).await;

        let retry_count = job.retry_count;
        match self.execute(job).await {
            Outcome::Translated(job, translations) => {
                let spans: Vec<_> = job.chunks.iter().map(Chunk::span).collect();
                let joined = join_translated(&job.source_text, &spans, &translations);
                self.store.record_chunks(job_id, job.chunks).await;
                match joined {
                    Ok(result) => self.finish(job_id, result, start).await,
                    Err(e) => self.retry_or_fail(job_id, retry_count, e.to_string()).await,
                }
            }
            Outcome::Failed(job, error) => {
                if let Some(job) = job {
                    self.store.record_chunks(job_id, job.chunks).await;
                }
                self.retry_or_fail(job_id, retry_count, error).await
            }
            Outcome::Released => {
                warn!(%job_id, "Job released while processing, moving on");
            }
        }

        self.queue.set_current(None).await;
    }

    /// Run the scheduler in its own task so a panic fails only this job and
    /// a sweep can abandon it.
    async fn execute(&self, mut job: Job) -> Outcome {
        let job_id = job.id;
        let scheduler = self.scheduler.clone();
        let mut task: JoinHandle<(Job, Result<Vec<String>>)> = tokio::spawn(async move {
            let result = scheduler.process_job(&mut job).await;
            (job, result)
        });

        tokio::select! {
            joined = &mut task => match joined {
                Ok((job, Ok(translations))) => Outcome::Translated(job, translations),
                Ok((job, Err(e))) => Outcome::Failed(Some(job), e.to_string()),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    error!(%job_id, panic = %message, "Job task panicked");
                    Outcome::Failed(None, format!("Job task panicked: {}", message))
                }
                Err(e) => Outcome::Failed(None, format!("Job task cancelled: {}", e)),
            },
            _ = self.store.wait_until_released(job_id) => {
                task.abort();
                Outcome::Released
            }
        }
    }

    async fn finish(&self, job_id: Uuid, result: String, start: Instant) {
        let duration_ms = start.elapsed().as_millis() as u64;
        if self.store.complete(job_id, result).await {
            info!(%job_id, duration_ms, "Job completed successfully");
            let _ = self
                .event_tx
                .send(RunnerEvent::JobCompleted { job_id, duration_ms });
        } else {
            warn!(%job_id, "Discarding result of job that is no longer processing");
        }
    }

    async fn retry_or_fail(&self, job_id: Uuid, retry_count: u32, error: String) {
        if retry_count < self.config.job_max_retries {
            if self.store.requeue(job_id).await {
                self.queue.push_front(job_id).await;
                warn!(
                    %job_id,
                    retry_count = retry_count + 1,
                    max_retries = self.config.job_max_retries,
                    %error,
                    "Job failed, requeued at front"
                );
                let _ = self.event_tx.send(RunnerEvent::JobRequeued {
                    job_id,
                    retry_count: retry_count + 1,
                    error,
                });
            }
            return;
        }

        if self.store.fail(job_id, error.clone()).await {
            warn!(%job_id, retry_count, %error, "Job failed");
            let _ = self
                .event_tx
                .send(RunnerEvent::JobFailed { job_id, error });
        }
    }

    /// Spawn the periodic stale sweep and eviction, if enabled.
    fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        if !self.config.enabled || self.config.sweep_interval_secs == 0 {
            return None;
        }

        let store = self.store.clone();
        let event_tx = self.event_tx.clone();
        let interval = Duration::from_secs(self.config.sweep_interval_secs);
        let threshold = self.config.stale_job_threshold();
        let retention = self.config.job_retention();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep_and_notify(&store, &event_tx, threshold).await;
                let evicted = store.evict_finished(retention).await;
                if evicted > 0 {
                    debug!(evicted, "Evicted finished jobs past retention");
                }
            }
        }))
    }
}

/// Builder for creating a job runner.
pub struct RunnerBuilder {
    client: Arc<dyn TranslationClient>,
    queue_config: QueueConfig,
    config: RunnerConfig,
    store: JobStore,
    queue: FifoQueue,
}

impl RunnerBuilder {
    /// Create a new runner builder translating through `client`.
    pub fn new(client: Arc<dyn TranslationClient>) -> Self {
        Self {
            client,
            queue_config: QueueConfig::default(),
            config: RunnerConfig::default(),
            store: JobStore::new(),
            queue: FifoQueue::new(),
        }
    }

    /// Set the chunking, batching and retry configuration.
    pub fn with_queue_config(mut self, config: QueueConfig) -> Self {
        self.queue_config = config;
        self
    }

    /// Set the runner configuration.
    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing store.
    pub fn with_store(mut self, store: JobStore) -> Self {
        self.store = store;
        self
    }

    /// Share an existing queue.
    pub fn with_queue(mut self, queue: FifoQueue) -> Self {
        self.queue = queue;
        self
    }

    /// Validate the configuration and build the runner.
    pub fn build(self) -> Result<JobRunner> {
        self.queue_config.validate()?;
        Ok(JobRunner::new(
            self.client,
            self.queue_config,
            self.config,
            self.store,
            self.queue,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transq_client::MockTranslationClient;

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert_eq!(config.job_max_retries, 2);
        assert_eq!(config.inter_job_delay(), Duration::from_secs(2));
        assert_eq!(config.stale_job_threshold(), Duration::from_secs(1800));
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.job_retention(), Duration::from_secs(1800));
        assert!(config.enabled);
    }

    #[test]
    fn test_runner_config_chaining() {
        let config = RunnerConfig::default()
            .with_job_max_retries(0)
            .with_inter_job_delay(10)
            .with_stale_job_threshold(5)
            .with_sweep_interval(0)
            .with_job_retention(7)
            .with_enabled(false);

        assert_eq!(config.job_max_retries, 0);
        assert_eq!(config.inter_job_delay_ms, 10);
        assert_eq!(config.stale_job_threshold_secs, 5);
        assert_eq!(config.sweep_interval_secs, 0);
        assert_eq!(config.job_retention_secs, 7);
        assert!(!config.enabled);
    }

    #[test]
    fn test_runner_config_partial_json_uses_defaults() {
        let config: RunnerConfig =
            serde_json::from_str(r#"{ "job_max_retries": 0, "enabled": false }"#).unwrap();
        assert_eq!(
            config,
            RunnerConfig::default()
                .with_job_max_retries(0)
                .with_enabled(false)
        );
        let value = serde_json::to_value(RunnerConfig::default()).unwrap();
        assert_eq!(value["inter_job_delay_ms"], 2000);
    }

    #[test]
    fn test_panic_message_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(s.as_ref()), "static str");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_builder_rejects_invalid_queue_config() {
        let result = RunnerBuilder::new(Arc::new(MockTranslationClient::new()))
            .with_queue_config(QueueConfig::default().with_batch_size(0))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_runner_event_serializes_tagged() {
        let job_id = Uuid::nil();
        let value = serde_json::to_value(RunnerEvent::JobProgress {
            job_id,
            progress: 55,
            completed_chunks: 2,
            total_chunks: 4,
        })
        .unwrap();
        assert_eq!(value["event"], "job_progress");
        assert_eq!(value["progress"], 55);
        assert_eq!(value["total_chunks"], 4);

        let value = serde_json::to_value(RunnerEvent::RunnerStopped).unwrap();
        assert_eq!(value, serde_json::json!({ "event": "runner_stopped" }));
    }

    #[tokio::test]
    async fn test_disabled_runner_leaves_jobs_pending() {
        let runner = RunnerBuilder::new(Arc::new(MockTranslationClient::new()))
            .with_runner_config(RunnerConfig::default().with_enabled(false))
            .build()
            .unwrap();
        let service = runner.service();
        let _handle = runner.start();

        let id = service.submit_job("Hello.", "en", "zh").await.unwrap();
        tokio::task::yield_now().await;
        let snapshot = service.get_job_status(id).await.unwrap();
        assert_eq!(snapshot.status, transq_core::JobStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_emits_lifecycle_events() {
        let runner = RunnerBuilder::new(Arc::new(MockTranslationClient::new()))
            .with_queue_config(QueueConfig::without_delays())
            .with_runner_config(RunnerConfig::default().with_inter_job_delay(0))
            .build()
            .unwrap();
        let service = runner.service();
        let handle = runner.start();
        let mut events = handle.events();

        let id = service.submit_job("Hello. World!", "en", "zh").await.unwrap();

        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("event before timeout")
                .unwrap();
            let done = matches!(event, RunnerEvent::JobCompleted { .. });
            seen.push(event);
            if done {
                break;
            }
        }

        assert!(seen.contains(&RunnerEvent::JobQueued { job_id: id }));
        assert!(seen.contains(&RunnerEvent::JobStarted {
            job_id: id,
            attempt: 1
        }));
        assert!(seen.iter().any(|e| matches!(
            e,
            RunnerEvent::JobProgress { job_id, progress: 10, .. } if *job_id == id
        )));
        handle.shutdown().await.unwrap();
    }
}
