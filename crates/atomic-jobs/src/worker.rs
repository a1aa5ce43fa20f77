//! Job worker and runner for processing background jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use atomic_core::{defaults, Job, JobRepository, JobType, Result};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Wall-clock limit for a single job.
    pub job_timeout_secs: u64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `1000` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `1800` | Per-job wall-clock timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults::JOB_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            job_timeout_secs,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted { job_id: Uuid, job_type: JobType },
    JobProgress {
        job_id: Uuid,
        percent: i32,
        stage: Option<String>,
        message: Option<String>,
    },
    JobCompleted { job_id: Uuid, job_type: JobType },
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| atomic_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

type HandlerMap = Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>;

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(jobs: Arc<dyn JobRepository>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            jobs,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register a handler for a job type.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let job_type = handler.job_type();
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type, Arc::new(handler));
        debug!(?job_type, "Registered job handler");
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Claim up to `max_concurrent_jobs` at a time and process them
    /// concurrently. Sleeps only when the queue is empty.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            job_timeout_secs = self.config.job_timeout_secs,
            "Job worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs.max(1);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn claim_job(&self) -> Option<Job> {
        let job_types: Vec<JobType> = {
            let handlers = self.handlers.read().await;
            handlers.keys().copied().collect()
        };
        if job_types.is_empty() {
            return None;
        }

        match self.jobs.claim_next_for_types(&job_types).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                None
            }
        }
    }

    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            jobs: self.jobs.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            job_timeout: Duration::from_secs(self.config.job_timeout_secs),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.jobs.pending_count().await
    }
}

/// References needed to execute one job in a spawned task.
struct JobWorkerRef {
    jobs: Arc<dyn JobRepository>,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    job_timeout: Duration,
}

struct ProgressUpdate {
    percent: i32,
    stage: Option<String>,
    message: Option<String>,
}

impl JobWorkerRef {
    /// Progress callbacks are synchronous; updates go through a channel to
    /// one writer task so they land in the job record in order.
    fn spawn_progress_writer(
        &self,
        job_id: Uuid,
    ) -> (
        mpsc::UnboundedSender<ProgressUpdate>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
        let jobs = self.jobs.clone();
        let event_tx = self.event_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                if let Err(e) = jobs
                    .update_progress(
                        job_id,
                        update.percent,
                        update.stage.as_deref(),
                        update.message.as_deref(),
                    )
                    .await
                {
                    warn!(%job_id, error = %e, "Failed to record job progress");
                }
                let _ = event_tx.send(WorkerEvent::JobProgress {
                    job_id,
                    percent: update.percent,
                    stage: update.stage,
                    message: update.message,
                });
            }
        });
        (tx, writer)
    }

    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;

        info!(subsystem = "jobs", %job_id, job_type = job_type.as_str(), "Processing job");

        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, job_type });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job_type).cloned()
        };

        let result = match handler {
            Some(handler) => {
                let (progress_tx, writer) = self.spawn_progress_writer(job_id);
                let ctx = JobContext::new(job).with_progress_callback(move |percent, stage, message| {
                    let _ = progress_tx.send(ProgressUpdate {
                        percent,
                        stage: stage.map(String::from),
                        message: message.map(String::from),
                    });
                });

                let result = match tokio::time::timeout(self.job_timeout, handler.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => {
                        let secs = self.job_timeout.as_secs();
                        warn!(%job_id, job_type = job_type.as_str(), "Job exceeded timeout of {}s", secs);
                        JobResult::Failed(format!("Job exceeded timeout of {}s", secs))
                    }
                };
                // Dropping the context closed the channel. Progress must not
                // land after the terminal write.
                if let Err(e) = writer.await {
                    error!(%job_id, error = ?e, "Progress writer panicked");
                }
                result
            }
            None => {
                warn!(job_type = job_type.as_str(), "No handler registered for job type");
                JobResult::Failed(format!("No handler for job type: {}", job_type.as_str()))
            }
        };

        match result {
            JobResult::Success(result_data) => {
                if let Err(e) = self.jobs.complete(job_id, result_data).await {
                    error!(error = %e, %job_id, "Failed to mark job as completed");
                } else {
                    info!(
                        %job_id,
                        job_type = job_type.as_str(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed successfully"
                    );
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::JobCompleted { job_id, job_type });
                }
            }
            JobResult::Failed(error) | JobResult::Retry(error) => {
                if let Err(e) = self.jobs.fail(job_id, &error).await {
                    error!(error = %e, %job_id, "Failed to mark job as failed");
                } else {
                    warn!(
                        %job_id,
                        job_type = job_type.as_str(),
                        %error,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job failed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        job_type,
                        error,
                    });
                }
            }
        }
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Vec<Box<dyn JobHandler>>,
}

impl WorkerBuilder {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let worker = JobWorker::new(self.jobs, self.config);

        {
            let mut handlers = worker.handlers.write().await;
            for handler in self.handlers {
                handlers.insert(handler.job_type(), Arc::from(handler));
            }
        }

        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 1_000);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_timeout_secs, 1_800);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(10)
            .with_max_concurrent(8)
            .with_job_timeout(5)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.job_timeout_secs, 5);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_event_debug() {
        let event = WorkerEvent::JobStarted {
            job_id: Uuid::new_v4(),
            job_type: JobType::YoutubeIngest,
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("JobStarted"));
        assert!(debug_str.contains("YoutubeIngest"));
    }
}
