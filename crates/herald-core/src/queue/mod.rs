//! Queue module: the job store port, retry policy, and store implementations.

mod memory;
#[cfg(feature = "redis")]
mod redis;
mod retry;

pub use memory::InMemoryJobStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisJobStore;
pub use retry::{QueuePolicies, QueuePolicy, RetryPolicy};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Job, JobId, JobRange, JobState, QueueHealth, QueueName, StoreError};

/// Job store port.
///
/// The store is the only place job state changes. Workers and the admin
/// surface call these operations and never edit records themselves; each
/// operation is atomic per job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Writes a new waiting job. Never waits on processing.
    async fn enqueue(&self, queue: QueueName, data: Value) -> Result<Job, StoreError>;

    /// Claims the oldest claimable job, or `None` when there is nothing to do.
    ///
    /// A claimed job is `Active` with `attempts` incremented; no concurrent
    /// caller can claim it.
    async fn dequeue_next(&self, queue: QueueName) -> Result<Option<Job>, StoreError>;

    /// `Active` -> `Succeeded`.
    ///
    /// `attempt` is the `attempts` value of the claim being reported. The
    /// report is a no-op unless the job is still active under that claim, so
    /// a worker whose job was reclaimed cannot touch the next claim.
    async fn report_success(
        &self,
        queue: QueueName,
        id: JobId,
        attempt: u32,
        result: Value,
    ) -> Result<(), StoreError>;

    /// Schedules a retry or, once attempts are exhausted, fails the job.
    /// Same claim check as `report_success`.
    async fn report_failure(
        &self,
        queue: QueueName,
        id: JobId,
        attempt: u32,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Jobs in `state`, oldest enqueue first.
    async fn get_jobs_by_state(
        &self,
        queue: QueueName,
        state: JobState,
        range: JobRange,
    ) -> Result<Vec<Job>, StoreError>;

    async fn get_job(&self, queue: QueueName, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Admin retry of a failed job.
    async fn retry_job(&self, queue: QueueName, id: JobId) -> Result<Job, StoreError>;

    /// Deletes a job in any state. Returns whether it existed.
    async fn remove_job(&self, queue: QueueName, id: JobId) -> Result<bool, StoreError>;

    async fn health(&self, queue: QueueName) -> Result<QueueHealth, StoreError>;

    /// Returns stale active jobs to waiting (or fails them when out of
    /// attempts). Returns the reclaimed ids.
    async fn reclaim_stalled(&self, queue: QueueName) -> Result<Vec<JobId>, StoreError>;

    /// Removes every failed job in the queue. Returns how many were removed.
    async fn clear_failed(&self, queue: QueueName) -> Result<usize, StoreError> {
        let failed = self
            .get_jobs_by_state(queue, JobState::Failed, JobRange::all())
            .await?;
        let mut removed = 0;
        for job in failed {
            if self.remove_job(queue, job.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// A claimed job.
/// The worker owns this lease and must either `ack` or `fail` it, which
/// consumes the lease so a job is reported at most once.
pub struct JobLease {
    store: Arc<dyn JobStore>,
    job: Job,
}

impl JobLease {
    pub async fn claim(
        store: &Arc<dyn JobStore>,
        queue: QueueName,
    ) -> Result<Option<Self>, StoreError> {
        let job = store.dequeue_next(queue).await?;
        Ok(job.map(|job| Self {
            store: Arc::clone(store),
            job,
        }))
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Mark success.
    pub async fn ack(self, result: Value) -> Result<(), StoreError> {
        self.store
            .report_success(self.job.queue, self.job.id, self.job.attempts, result)
            .await
    }

    /// Mark failure (the store decides retry or terminal failure).
    pub async fn fail(self, error: &str) -> Result<(), StoreError> {
        self.store
            .report_failure(self.job.queue, self.job.id, self.job.attempts, error)
            .await
    }
}
