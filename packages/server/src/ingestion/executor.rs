use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::info;

/// A detached unit of background work.
pub type Job = BoxFuture<'static, ()>;

/// Runs background jobs with a lifetime independent of the submitting request.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn submit(&self, job: Job);
}

/// Tokio-backed pool. Every job is spawned immediately; at most
/// `max_concurrent` run at once, the rest wait for a permit.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Number of submitted jobs that have not finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting new jobs and wait for the in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!(in_flight = self.in_flight(), "Waiting for background jobs");
        self.tracker.wait().await;
    }
}

#[async_trait]
impl JobExecutor for WorkerPool {
    async fn submit(&self, job: Job) {
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }
}

/// Runs each job to completion inside `submit`. Used by tests to make the
/// background pipeline deterministic.
pub struct InlineExecutor;

#[async_trait]
impl JobExecutor for InlineExecutor {
    async fn submit(&self, job: Job) {
        job.await;
    }
}
