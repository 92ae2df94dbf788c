//! Shared job queue and result store
//!
//! The queue is a FIFO of `(job_id, serialized job)` pairs with atomic pop from
//! the head. Results live in a key/value store under `result:<job_id>` with an
//! expiry. These two primitives are the only state shared between the dispatcher
//! and its callers.

pub mod memory;
#[cfg(feature = "sqlite-queue")]
pub mod sqlite;

pub use memory::{MemoryQueue, MemoryResultStore};
#[cfg(feature = "sqlite-queue")]
pub use sqlite::SqliteBackend;

use crate::types::{AppError, Job, JobRequest, JobResult, Result};
use crate::utils::toml_config::{QueueBackend, SwitchboardConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const OVERLOADED_MESSAGE: &str =
    "The agent service is currently overloaded. Please try again shortly.";

pub const TIMEOUT_MESSAGE: &str = "Request timed out waiting for agent.";

/// Longest time a result is kept; larger TTLs are capped to this
pub const MAX_RESULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Key a job's result is stored under
pub fn result_key(job_id: &str) -> String {
    format!("result:{}", job_id)
}

/// One queued job as it travels through the queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub job_id: String,
    pub payload: String,
}

impl QueueEntry {
    pub fn from_job(job: &Job) -> Result<Self> {
        Ok(Self {
            job_id: job.job_id.clone(),
            payload: serde_json::to_string(job)?,
        })
    }

    pub fn decode(&self) -> Result<Job> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append to the tail
    async fn push(&self, entry: QueueEntry) -> Result<()>;

    /// Remove and return the head, `None` when empty
    async fn pop(&self) -> Result<Option<QueueEntry>>;

    async fn len(&self) -> Result<usize>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Value for `key`, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns whether a live value was removed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Serialize and store the result of `job_id`
pub async fn publish_result(
    store: &dyn ResultStore,
    job_id: &str,
    result: &JobResult,
    ttl: Duration,
) -> Result<()> {
    let value = serde_json::to_string(result)?;
    store.set(&result_key(job_id), value, ttl).await
}

/// Open the queue and result store described by `[queue]`
pub async fn open(config: &SwitchboardConfig) -> Result<(Arc<dyn JobQueue>, Arc<dyn ResultStore>)> {
    match config.queue.backend {
        QueueBackend::Memory => {
            let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());
            let results: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());
            Ok((queue, results))
        }
        #[cfg(feature = "sqlite-queue")]
        QueueBackend::Sqlite => {
            let backend = Arc::new(SqliteBackend::open(config.resolve(&config.queue.path)).await?);
            let queue: Arc<dyn JobQueue> = backend.clone();
            let results: Arc<dyn ResultStore> = backend;
            Ok((queue, results))
        }
        #[cfg(not(feature = "sqlite-queue"))]
        QueueBackend::Sqlite => Err(AppError::Configuration(
            "the sqlite queue backend requires the 'sqlite-queue' feature".to_string(),
        )),
    }
}

/// Caller side of the queue: admission control, submit, and result polling
#[derive(Clone)]
pub struct JobClient {
    queue: Arc<dyn JobQueue>,
    results: Arc<dyn ResultStore>,
    max_queue_length: usize,
    poll_interval: Duration,
}

impl JobClient {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
        max_queue_length: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            results,
            max_queue_length,
            poll_interval,
        }
    }

    /// Enqueue a request and return its new job id.
    ///
    /// Fails with [`AppError::Overloaded`] without enqueueing anything when the
    /// queue already holds `max_queue_length` jobs.
    pub async fn submit(&self, request: JobRequest) -> Result<String> {
        let queued = self.queue.len().await?;
        if queued >= self.max_queue_length {
            warn!(queued, max = self.max_queue_length, "Rejecting submission, queue full");
            return Err(AppError::Overloaded(OVERLOADED_MESSAGE.to_string()));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let job = request.into_job(job_id.clone());
        self.queue.push(QueueEntry::from_job(&job)?).await?;
        debug!(job_id = %job_id, "Job enqueued");
        Ok(job_id)
    }

    /// Poll for the result of `job_id`. The result is deleted once read.
    pub async fn await_result(&self, job_id: &str, timeout: Duration) -> Result<JobResult> {
        let key = result_key(job_id);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(raw) = self.results.get(&key).await? {
                self.results.delete(&key).await?;
                return Ok(serde_json::from_str(&raw)?);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(job_id, "Timed out waiting for result");
                return Err(AppError::Timeout(TIMEOUT_MESSAGE.to_string()));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Submit and wait in one call
    pub async fn ask(&self, request: JobRequest, timeout: Duration) -> Result<JobResult> {
        let job_id = self.submit(request).await?;
        self.await_result(&job_id, timeout).await
    }
}
