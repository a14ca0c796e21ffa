//! Errors - エラー型と分類
//!
//! # 分類
//! - [`ValidationError`]: admin 入力の不備。4xx、リトライしない
//! - [`StoreError`]: Job Store の障害・不正遷移。`Unavailable` は接続系（一時的）
//! - [`JobError`]: job 処理中の失敗。すべて 1 attempt を消費し、retry policy に従う

use thiserror::Error;

use crate::domain::ids::JobId;
use crate::domain::job::JobState;
use crate::domain::queue_name::QueueName;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or transient failure talking to the backing store.
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("job store error: {0}")]
    Backend(String),

    #[error("job {id} not found in queue {queue}")]
    NotFound { queue: QueueName, id: JobId },

    #[error("job {id} is {actual}, expected {expected}")]
    InvalidTransition {
        id: JobId,
        expected: JobState,
        actual: JobState,
    },

    #[error("job record serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Transient errors are worth retrying from the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Failure while processing a single job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Delivery(String),

    #[error("unknown waitlist job type: {0}")]
    UnknownJobKind(String),

    #[error("invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("waitlist directory: {0}")]
    Directory(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
