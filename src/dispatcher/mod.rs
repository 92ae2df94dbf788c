//! Job dispatcher and worker pool
//!
//! A single poll loop owns `N` worker slots. Each iteration reaps finished
//! jobs and publishes their results, then pops at most one job from the head
//! of the queue and hands it to a free worker. Workers run as tokio tasks; a
//! panicking job is converted into an error result and its slot is reused
//! with a fresh worker state.

pub mod worker;

pub use worker::{process_job, WorkerContext, WorkerState};

use crate::engine::EngineFactory;
use crate::providers::ProviderFactory;
use crate::queue::{self, JobQueue, ResultStore};
use crate::types::{JobResult, Result};
use crate::utils::toml_config::{DispatcherConfig, SwitchboardConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Running {
    worker: usize,
    job_id: String,
    handle: JoinHandle<(WorkerState, JobResult)>,
}

pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    results: Arc<dyn ResultStore>,
    ctx: Arc<WorkerContext>,
    /// Free workers; the most recently used one is handed out first
    idle: Vec<WorkerState>,
    busy: Vec<Running>,
    poll_interval: Duration,
    result_ttl: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
        ctx: Arc<WorkerContext>,
        settings: &DispatcherConfig,
    ) -> Self {
        let workers = settings.workers.max(1);
        Self {
            queue,
            results,
            ctx,
            idle: (0..workers).rev().map(WorkerState::new).collect(),
            busy: Vec::with_capacity(workers),
            poll_interval: settings.poll_interval(),
            result_ttl: settings.result_ttl(),
        }
    }

    /// Build a dispatcher with the queue backend and collaborators from `config`
    pub async fn from_config(
        config: &SwitchboardConfig,
        engines: Arc<dyn EngineFactory>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Result<Self> {
        let (queue, results) = queue::open(config).await?;
        let ctx = WorkerContext::from_config(config, engines, providers)?;
        Ok(Self::new(queue, results, Arc::new(ctx), &config.dispatcher))
    }

    pub fn workers(&self) -> usize {
        self.idle.len() + self.busy.len()
    }

    /// Jobs currently being processed
    pub fn in_flight(&self) -> usize {
        self.busy.len()
    }

    /// One loop iteration: reap, then start at most one job.
    ///
    /// Returns whether a job was taken off the queue.
    pub async fn tick(&mut self) -> Result<bool> {
        self.reap().await;

        let Some(state) = self.idle.pop() else {
            return Ok(false);
        };
        let entry = match self.queue.pop().await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.idle.push(state);
                return Ok(false);
            }
            Err(e) => {
                self.idle.push(state);
                return Err(e);
            }
        };

        let job = match entry.decode() {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %entry.job_id, error = %e, "Discarding undecodable job");
                self.idle.push(state);
                let result = JobResult::error(format!("Invalid job payload: {}", e));
                self.publish(&entry.job_id, &result).await;
                return Ok(true);
            }
        };

        let worker = state.id();
        debug!(job_id = %job.job_id, worker, "Dispatching job");
        let job_id = job.job_id.clone();
        let handle = tokio::spawn(process_job(state, self.ctx.clone(), job));
        self.busy.push(Running {
            worker,
            job_id,
            handle,
        });
        Ok(true)
    }

    /// Poll until `shutdown` resolves, then wait for in-flight jobs.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(workers = self.workers(), "Dispatcher started");

        loop {
            let started = match self.tick().await {
                Ok(started) => started,
                Err(e) => {
                    error!(error = %e, "Queue poll failed");
                    false
                }
            };
            if started {
                continue;
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(in_flight = self.in_flight(), "Shutting down, draining in-flight jobs");
        self.drain().await;
        info!("Dispatcher stopped");
    }

    /// Wait for every in-flight job and publish its result
    pub async fn drain(&mut self) {
        for running in std::mem::take(&mut self.busy) {
            self.finish(running).await;
        }
    }

    async fn reap(&mut self) {
        let mut index = 0;
        while index < self.busy.len() {
            if self.busy[index].handle.is_finished() {
                let running = self.busy.swap_remove(index);
                self.finish(running).await;
            } else {
                index += 1;
            }
        }
    }

    async fn finish(&mut self, running: Running) {
        let Running {
            worker,
            job_id,
            handle,
        } = running;

        let (state, result) = match handle.await {
            Ok(done) => done,
            Err(e) => {
                error!(job_id = %job_id, worker, error = %e, "Worker task failed");
                (
                    WorkerState::new(worker),
                    JobResult::error(format!("Worker failed while processing the job: {}", e)),
                )
            }
        };

        self.idle.push(state);
        self.publish(&job_id, &result).await;
    }

    async fn publish(&mut self, job_id: &str, result: &JobResult) {
        match queue::publish_result(self.results.as_ref(), job_id, result, self.result_ttl).await {
            Ok(()) => debug!(job_id, status = ?result.status, "Result published"),
            Err(e) => error!(job_id, error = %e, "Failed to publish result"),
        }
    }
}
