//! QueueAdmin - 管理画面向けの操作
//!
//! HTTP 層はここを呼ぶだけで、store を直接触らない。
//! 入力の検証（メッセージ長、メールアドレス）もここで行う。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::producer::Producer;
use crate::domain::{
    DEFAULT_APP_SLUG, Job, JobId, JobRange, JobState, QueueHealth, QueueName, StoreError,
    ValidationError,
};
use crate::ports::{Clock, DirectoryError, SystemClock, WaitlistDirectory};
use crate::queue::JobStore;

/// Jobs shown per list in the overview.
pub const OVERVIEW_PAGE_SIZE: usize = 10;
pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("{0} is not on the waitlist")]
    NotAMember(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuesOverview {
    pub email: QueueOverview,
    pub waitlist: QueueOverview,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOverview {
    pub health: QueueHealth,
    pub waiting: usize,
    pub failed: usize,
    pub recent_jobs: Vec<RecentJob>,
    pub recent_failures: Vec<RecentFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentJob {
    pub id: JobId,
    pub data: Value,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFailure {
    pub id: JobId,
    pub data: Value,
    pub error: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitlistStats {
    pub total: usize,
    /// Joined within the last 24 hours.
    pub recent: usize,
    pub positions: Vec<WaitlistPosition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistPosition {
    pub email: String,
    pub position: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct QueueAdmin {
    store: Arc<dyn JobStore>,
    producer: Producer,
    directory: Arc<dyn WaitlistDirectory>,
    clock: Arc<dyn Clock>,
}

impl QueueAdmin {
    pub fn new(store: Arc<dyn JobStore>, directory: Arc<dyn WaitlistDirectory>) -> Self {
        Self {
            producer: Producer::new(Arc::clone(&store)),
            store,
            directory,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn overview(&self) -> Result<QueuesOverview, StoreError> {
        Ok(QueuesOverview {
            email: self.queue_overview(QueueName::Email).await?,
            waitlist: self.queue_overview(QueueName::Waitlist).await?,
        })
    }

    pub async fn queue_overview(&self, queue: QueueName) -> Result<QueueOverview, StoreError> {
        let health = self.store.health(queue).await?;
        let page = JobRange::first(OVERVIEW_PAGE_SIZE);
        let waiting = self
            .store
            .get_jobs_by_state(queue, JobState::Waiting, page)
            .await?;
        let failed = self
            .store
            .get_jobs_by_state(queue, JobState::Failed, page)
            .await?;

        Ok(QueueOverview {
            health,
            waiting: health.waiting,
            failed: health.failed,
            recent_jobs: waiting
                .into_iter()
                .map(|job| RecentJob {
                    id: job.id,
                    data: job.data,
                    created: job.created_at,
                })
                .collect(),
            recent_failures: failed
                .into_iter()
                .map(|job| RecentFailure {
                    id: job.id,
                    data: job.data,
                    error: job.last_error,
                    failed_at: job.failed_at,
                })
                .collect(),
        })
    }

    pub async fn job(&self, queue: QueueName, id: JobId) -> Result<Job, StoreError> {
        self.store
            .get_job(queue, id)
            .await?
            .ok_or(StoreError::NotFound { queue, id })
    }

    /// Moves a failed job back to waiting.
    pub async fn retry(&self, queue: QueueName, id: JobId) -> Result<Job, StoreError> {
        let job = self.store.retry_job(queue, id).await?;
        tracing::info!(queue = queue.as_str(), job_id = %id, "job retried by admin");
        Ok(job)
    }

    pub async fn clear_failed(&self, queue: QueueName) -> Result<usize, StoreError> {
        let removed = self.store.clear_failed(queue).await?;
        tracing::info!(queue = queue.as_str(), removed, "cleared failed jobs");
        Ok(removed)
    }

    pub async fn waitlist_stats(&self) -> Result<WaitlistStats, AdminError> {
        let entries = self.directory.entries(DEFAULT_APP_SLUG).await?;
        let since = self.clock.now() - chrono::Duration::hours(24);
        Ok(WaitlistStats {
            total: entries.len(),
            recent: entries.iter().filter(|e| e.created_at >= since).count(),
            positions: entries
                .into_iter()
                .take(OVERVIEW_PAGE_SIZE)
                .map(|e| WaitlistPosition {
                    email: e.email,
                    position: e.position,
                    created_at: e.created_at,
                })
                .collect(),
        })
    }

    /// Queues one `bulk_update` to every member of the default app.
    pub async fn broadcast_update(&self, message: &str) -> Result<JobId, AdminError> {
        let message = validate_message(message)?;
        let id = self.producer.send_bulk_update(message, None).await?;
        tracing::info!(job_id = %id, "bulk waitlist update queued");
        Ok(id)
    }

    /// Queues an `update` email to one member with their current position.
    pub async fn notify_member(&self, email: &str, message: &str) -> Result<JobId, AdminError> {
        let email = validate_email(email)?;
        let message = validate_message(message)?;
        let Some(entry) = self.directory.find(DEFAULT_APP_SLUG, email).await? else {
            return Err(AdminError::NotAMember(email.to_string()));
        };
        let total = self.directory.count(DEFAULT_APP_SLUG).await?;
        let id = self
            .producer
            .send_update_email(entry.email, entry.position, total as u64, Some(message.to_string()))
            .await?;
        Ok(id)
    }
}

fn validate_message(message: &str) -> Result<&str, ValidationError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ValidationError::MissingField("message"));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ValidationError::InvalidMessage(format!(
            "must be at most {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(message)
}

fn validate_email(email: &str) -> Result<&str, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingField("email"));
    }
    // lettre accepts dotless domains such as `localhost`; members need a real one
    match email.parse::<lettre::Address>() {
        Ok(address) if address.domain().contains('.') => Ok(email),
        _ => Err(ValidationError::InvalidEmail(email.to_string())),
    }
}
