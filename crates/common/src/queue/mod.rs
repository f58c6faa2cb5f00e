//! In-process background work queue
//!
//! Provides:
//! - Non-blocking submission from request handlers (`submit` never awaits)
//! - A single supervisor task draining a bounded channel
//! - Bounded concurrency for job execution
//! - Failure containment: handler errors are logged, panics are caught and
//!   logged, and neither reaches the submitter or stops the worker
//!
//! Jobs are never retried. A full or closed queue drops the job with a warning.

use crate::errors::Result;
use crate::metrics;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// A unit of background work
pub trait Job: Debug + Send + 'static {
    /// Short operation label for logs and metrics
    fn operation(&self) -> &'static str;
}

/// Executes jobs taken off the queue
#[async_trait]
pub trait JobHandler<J: Job>: Send + Sync + 'static {
    async fn handle(&self, job: J) -> Result<()>;
}

/// Work queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Name used in logs and metric labels
    pub name: String,
    /// Jobs buffered before submissions are dropped
    pub capacity: usize,
    /// Jobs executing at the same time
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            capacity: 1024,
            concurrency: 4,
        }
    }
}

/// Handle for submitting jobs. Cloning shares the same queue; the worker
/// drains remaining jobs and exits once every handle is dropped.
pub struct WorkQueue<J: Job> {
    name: Arc<str>,
    sender: mpsc::Sender<J>,
}

impl<J: Job> Clone for WorkQueue<J> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<J: Job> WorkQueue<J> {
    /// Start the worker and return a submission handle plus the worker's join handle
    pub fn start<H: JobHandler<J>>(config: QueueConfig, handler: Arc<H>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let name: Arc<str> = Arc::from(config.name.as_str());

        let worker = tokio::spawn(run_worker(
            name.clone(),
            config.concurrency.max(1),
            handler,
            receiver,
        ));

        info!(
            queue = %name,
            capacity = config.capacity,
            concurrency = config.concurrency,
            "Work queue started"
        );

        (Self { name, sender }, worker)
    }

    /// Enqueue a job without waiting. Returns `false` if the job was dropped.
    pub fn submit(&self, job: J) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(
                    queue = %self.name,
                    operation = job.operation(),
                    job = ?job,
                    "Queue full, dropping job"
                );
                metrics::record_dropped_job(&self.name);
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(
                    queue = %self.name,
                    operation = job.operation(),
                    job = ?job,
                    "Queue closed, dropping job"
                );
                metrics::record_dropped_job(&self.name);
                false
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

async fn run_worker<J: Job, H: JobHandler<J>>(
    name: Arc<str>,
    concurrency: usize,
    handler: Arc<H>,
    mut receiver: mpsc::Receiver<J>,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut running = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let handler = handler.clone();
        let queue = name.clone();

        running.spawn(async move {
            let _permit = permit;
            run_job(&queue, handler.as_ref(), job).await;
        });

        // Reap finished jobs so the set does not grow unbounded
        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
    info!(queue = %name, "Work queue drained, worker stopped");
}

async fn run_job<J: Job, H: JobHandler<J>>(queue: &str, handler: &H, job: J) {
    let operation = job.operation();
    let summary = format!("{:?}", job);

    match AssertUnwindSafe(handler.handle(job)).catch_unwind().await {
        Ok(Ok(())) => {
            debug!(queue, operation, job = %summary, "Job completed");
            metrics::record_queue_job(queue, operation, "success");
        }
        Ok(Err(e)) => {
            warn!(queue, operation, job = %summary, error = %e, "Job failed");
            metrics::record_queue_job(queue, operation, "error");
        }
        Err(panic) => {
            error!(
                queue,
                operation,
                job = %summary,
                panic = %panic_message(panic.as_ref()),
                "Job panicked"
            );
            metrics::record_queue_job(queue, operation, "panic");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
