//! Job record and its state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::JobId;
use crate::domain::queue_name::QueueName;

/// Job state.
///
/// State transitions:
/// - Waiting -> Active -> Succeeded
/// - Waiting -> Active -> Waiting (retry scheduled, while attempts remain)
/// - Waiting -> Active -> Failed (attempts exhausted)
/// - Failed -> Waiting (admin retry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of asynchronous work, as tracked by the job store.
///
/// This is the single source of truth for a job's state; the store's
/// ordering structures only hold ids. All transitions happen through the
/// methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub queue: QueueName,
    pub data: serde_json::Value,
    pub state: JobState,

    /// Dispatch attempts so far (incremented on every claim).
    pub attempts: u32,
    pub max_retries: u32,

    /// Monotonic enqueue position within the store, used for listing order.
    pub sequence: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Earliest time a retry may be claimed.
    pub run_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl Job {
    pub fn new(
        id: JobId,
        queue: QueueName,
        data: serde_json::Value,
        max_retries: u32,
        sequence: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            queue,
            data,
            state: JobState::Waiting,
            attempts: 0,
            max_retries,
            sequence,
            created_at: now,
            updated_at: now,
            claimed_at: None,
            run_at: None,
            failed_at: None,
            last_error: None,
            result: None,
        }
    }

    /// Waitlist discriminator (`welcome`, `update`, `bulk_update`), if the
    /// payload carries one.
    pub fn kind(&self) -> Option<&str> {
        self.data.get("type").and_then(|v| v.as_str())
    }

    /// Whether `dequeue_next` may hand this job out at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Waiting && self.run_at.is_none_or(|at| at <= now)
    }

    /// Active under the claim that produced `attempt`.
    pub fn is_claimed_by(&self, attempt: u32) -> bool {
        self.state == JobState::Active && self.attempts == attempt
    }

    /// Whether attempts remain after the current one failed.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts <= self.max_retries
    }

    /// Mark as active (increment attempts).
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.attempts += 1;
        self.claimed_at = Some(now);
        self.run_at = None;
        self.updated_at = now;
    }

    pub fn mark_succeeded(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.state = JobState::Succeeded;
        self.result = Some(result);
        self.claimed_at = None;
        self.updated_at = now;
    }

    /// Back to waiting; not claimable before `run_at`.
    pub fn schedule_retry(&mut self, run_at: DateTime<Utc>, error: String, now: DateTime<Utc>) {
        self.state = JobState::Waiting;
        self.run_at = Some(run_at);
        self.claimed_at = None;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Terminal failure (attempts exhausted).
    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.claimed_at = None;
        self.run_at = None;
        self.failed_at = Some(now);
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Admin retry: fresh attempt budget, immediately claimable.
    /// `last_error` stays for display until the next attempt overwrites it.
    pub fn reset_for_retry(&mut self, sequence: u64, now: DateTime<Utc>) {
        self.state = JobState::Waiting;
        self.attempts = 0;
        self.sequence = sequence;
        self.failed_at = None;
        self.run_at = None;
        self.claimed_at = None;
        self.result = None;
        self.updated_at = now;
    }
}

/// Inclusive index range for paginated listings.
///
/// `end: None` means "through the last job".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl JobRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// The first `n` jobs.
    pub fn first(n: usize) -> Self {
        match n.checked_sub(1) {
            Some(end) => Self::new(0, end),
            // start > end selects nothing
            None => Self::new(1, 0),
        }
    }

    pub fn all() -> Self {
        Self {
            start: 0,
            end: None,
        }
    }

    /// Applies the range to an already ordered list.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let end = self.end.unwrap_or(usize::MAX);
        items
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i >= self.start && *i <= end)
            .map(|(_, item)| item)
            .collect()
    }
}

/// Counts of records currently tracked by a queue (not cumulative history).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHealth {
    pub waiting: usize,
    pub active: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Subset of `waiting` still inside a retry delay.
    pub delayed: usize,
}

impl QueueHealth {
    pub fn count(&mut self, job: &Job, now: DateTime<Utc>) {
        match job.state {
            JobState::Waiting => {
                self.waiting += 1;
                if job.run_at.is_some_and(|at| at > now) {
                    self.delayed += 1;
                }
            }
            JobState::Active => self.active += 1,
            JobState::Succeeded => self.succeeded += 1,
            JobState::Failed => self.failed += 1,
        }
    }
}
