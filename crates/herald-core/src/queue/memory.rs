//! In-memory job store.
//!
//! Used for development and tests, and as the reference for what the Redis
//! store must do. All queues live behind one mutex, so every operation is
//! atomic per job.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{JobStore, QueuePolicies, QueuePolicy};
use crate::domain::{
    Job, JobId, JobRange, JobState, QueueEvent, QueueHealth, QueueName, StoreError,
};
use crate::impls::event_sinks::NoopEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, SystemClock, UlidGenerator};

/// Retry backoff entry.
///
/// Ordering is reversed so the BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    run_at: DateTime<Utc>,
    sequence: u64,
    id: JobId,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .run_at
            .cmp(&self.run_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Per-queue state. `records` is the single source of truth; the other
/// structures hold ids only.
#[derive(Default)]
struct QueueState {
    records: HashMap<JobId, Job>,
    waiting: VecDeque<JobId>,
    delayed: BinaryHeap<ScheduledJob>,
    /// Retention order, oldest first.
    succeeded: VecDeque<JobId>,
    failed: VecDeque<JobId>,
}

impl QueueState {
    /// Move jobs whose retry delay elapsed to the back of the waiting list.
    fn promote_delayed(&mut self, now: DateTime<Utc>) {
        while let Some(entry) = self.delayed.peek() {
            if entry.run_at > now {
                break;
            }
            let Some(entry) = self.delayed.pop() else {
                break;
            };
            let still_delayed = self
                .records
                .get(&entry.id)
                .is_some_and(|job| job.state == JobState::Waiting && job.run_at == Some(entry.run_at));
            if still_delayed {
                self.waiting.push_back(entry.id);
            }
        }
    }

    fn claim(&mut self, now: DateTime<Utc>) -> Option<Job> {
        while let Some(id) = self.waiting.pop_front() {
            // stale ids (removed, already claimed) are skipped
            if let Some(job) = self.records.get_mut(&id) {
                if job.is_claimable(now) {
                    job.start_attempt(now);
                    return Some(job.clone());
                }
            }
        }
        None
    }

    fn forget(&mut self, id: JobId) -> Option<Job> {
        let job = self.records.remove(&id)?;
        self.waiting.retain(|other| *other != id);
        self.succeeded.retain(|other| *other != id);
        self.failed.retain(|other| *other != id);
        Some(job)
    }

    fn fail_terminally(
        &mut self,
        queue: QueueName,
        id: JobId,
        error: String,
        policy: &QueuePolicy,
        now: DateTime<Utc>,
        events: &mut Vec<QueueEvent>,
    ) {
        let Some(job) = self.records.get_mut(&id) else {
            return;
        };
        job.mark_failed(error.clone(), now);
        events.push(QueueEvent::Failed {
            queue,
            job_id: id,
            attempts: job.attempts,
            error,
        });
        self.failed.push_back(id);
        while self.failed.len() > policy.remove_on_failure {
            if let Some(old) = self.failed.pop_front() {
                self.records.remove(&old);
                events.push(QueueEvent::Evicted { queue, job_id: old });
            }
        }
    }

    fn health(&self, now: DateTime<Utc>) -> QueueHealth {
        let mut health = QueueHealth::default();
        for job in self.records.values() {
            health.count(job, now);
        }
        health
    }
}

struct StoreState {
    queues: HashMap<QueueName, QueueState>,
    next_sequence: u64,
}

impl StoreState {
    fn new() -> Self {
        Self {
            queues: QueueName::ALL
                .into_iter()
                .map(|q| (q, QueueState::default()))
                .collect(),
            next_sequence: 1,
        }
    }

    fn allocate_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn queue(&mut self, queue: QueueName) -> &mut QueueState {
        self.queues.entry(queue).or_default()
    }
}

pub struct InMemoryJobStore {
    state: Arc<Mutex<StoreState>>,
    policies: QueuePolicies,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
}

impl InMemoryJobStore {
    pub fn new(policies: QueuePolicies) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            state: Arc::new(Mutex::new(StoreState::new())),
            policies,
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            events: Arc::new(NoopEventSink),
        }
    }

    /// Replaces the clock (and the id generator reading it).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        self.clock = clock;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn policies(&self) -> &QueuePolicies {
        &self.policies
    }

    fn emit_all(&self, events: Vec<QueueEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(QueuePolicies::default())
    }
}

fn chrono_delay(delay: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::weeks(52))
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, queue: QueueName, data: Value) -> Result<Job, StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let job = {
            let mut state = self.state.lock().await;
            let sequence = state.allocate_sequence();
            let job = Job::new(
                self.ids.generate_job_id(),
                queue,
                data,
                policy.max_retries,
                sequence,
                now,
            );
            let q = state.queue(queue);
            q.records.insert(job.id, job.clone());
            q.waiting.push_back(job.id);
            job
        };
        self.events.emit(&QueueEvent::Enqueued {
            queue,
            job_id: job.id,
        });
        Ok(job)
    }

    async fn dequeue_next(&self, queue: QueueName) -> Result<Option<Job>, StoreError> {
        let now = self.clock.now();
        let claimed = {
            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            q.promote_delayed(now);
            q.claim(now)
        };
        if let Some(job) = &claimed {
            self.events.emit(&QueueEvent::Claimed {
                queue,
                job_id: job.id,
                attempts: job.attempts,
            });
        }
        Ok(claimed)
    }

    async fn report_success(
        &self,
        queue: QueueName,
        id: JobId,
        attempt: u32,
        result: Value,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            let Some(job) = q.records.get_mut(&id) else {
                return Ok(());
            };
            if !job.is_claimed_by(attempt) {
                return Ok(());
            }
            job.mark_succeeded(result.clone(), now);
            events.push(QueueEvent::Succeeded {
                queue,
                job_id: id,
                result,
            });
            q.succeeded.push_back(id);
            while q.succeeded.len() > policy.remove_on_success {
                if let Some(old) = q.succeeded.pop_front() {
                    q.records.remove(&old);
                    events.push(QueueEvent::Evicted { queue, job_id: old });
                }
            }
        }
        self.emit_all(events);
        Ok(())
    }

    async fn report_failure(
        &self,
        queue: QueueName,
        id: JobId,
        attempt: u32,
        error: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            let Some(job) = q.records.get_mut(&id) else {
                return Ok(());
            };
            if !job.is_claimed_by(attempt) {
                return Ok(());
            }

            if job.has_attempts_left() {
                let delay = policy.retry.next_delay(job.attempts);
                let run_at = now + chrono_delay(delay);
                job.schedule_retry(run_at, error.to_string(), now);
                events.push(QueueEvent::RetryScheduled {
                    queue,
                    job_id: id,
                    attempts: job.attempts,
                    delay,
                    error: error.to_string(),
                });
                let sequence = job.sequence;
                q.delayed.push(ScheduledJob {
                    run_at,
                    sequence,
                    id,
                });
            } else {
                q.fail_terminally(queue, id, error.to_string(), policy, now, &mut events);
            }
        }
        self.emit_all(events);
        Ok(())
    }

    async fn get_jobs_by_state(
        &self,
        queue: QueueName,
        state: JobState,
        range: JobRange,
    ) -> Result<Vec<Job>, StoreError> {
        let mut guard = self.state.lock().await;
        let mut jobs: Vec<Job> = guard
            .queue(queue)
            .records
            .values()
            .filter(|job| job.state == state)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.sequence);
        Ok(range.slice(jobs))
    }

    async fn get_job(&self, queue: QueueName, id: JobId) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.queue(queue).records.get(&id).cloned())
    }

    async fn retry_job(&self, queue: QueueName, id: JobId) -> Result<Job, StoreError> {
        let now = self.clock.now();
        let job = {
            let mut state = self.state.lock().await;
            let sequence = state.allocate_sequence();
            let q = state.queue(queue);
            let Some(job) = q.records.get_mut(&id) else {
                return Err(StoreError::NotFound { queue, id });
            };
            if job.state != JobState::Failed {
                return Err(StoreError::InvalidTransition {
                    id,
                    expected: JobState::Failed,
                    actual: job.state,
                });
            }
            job.reset_for_retry(sequence, now);
            let job = job.clone();
            q.failed.retain(|other| *other != id);
            q.waiting.push_back(id);
            job
        };
        self.events.emit(&QueueEvent::Retried { queue, job_id: id });
        Ok(job)
    }

    async fn remove_job(&self, queue: QueueName, id: JobId) -> Result<bool, StoreError> {
        let removed = {
            let mut state = self.state.lock().await;
            state.queue(queue).forget(id).is_some()
        };
        if removed {
            self.events.emit(&QueueEvent::Removed { queue, job_id: id });
        }
        Ok(removed)
    }

    async fn health(&self, queue: QueueName) -> Result<QueueHealth, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.queue(queue).health(now))
    }

    async fn reclaim_stalled(&self, queue: QueueName) -> Result<Vec<JobId>, StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let cutoff = now - chrono_delay(policy.stalled_after);
        let mut events = Vec::new();
        let mut reclaimed = Vec::new();
        {
            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            let mut stalled: Vec<(u64, JobId)> = q
                .records
                .values()
                .filter(|job| {
                    job.state == JobState::Active && job.claimed_at.is_some_and(|at| at <= cutoff)
                })
                .map(|job| (job.sequence, job.id))
                .collect();
            stalled.sort();

            for (_, id) in stalled {
                let Some(job) = q.records.get_mut(&id) else {
                    continue;
                };
                let requeued = job.has_attempts_left();
                if requeued {
                    job.schedule_retry(now, "job stalled".to_string(), now);
                    q.waiting.push_back(id);
                } else {
                    q.fail_terminally(queue, id, "job stalled".to_string(), policy, now, &mut events);
                }
                events.push(QueueEvent::Stalled {
                    queue,
                    job_id: id,
                    requeued,
                });
                reclaimed.push(id);
            }
        }
        self.emit_all(events);
        Ok(reclaimed)
    }
}
