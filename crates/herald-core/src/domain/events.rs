//! Events - job ライフサイクルイベント
//!
//! Job Store は状態遷移のたびに [`QueueEvent`] を `EventSink` に流します。
//! ログ出力やメトリクスはこのイベントの購読側で行い、store 自体は何も出力しません。

use std::time::Duration;

use serde::Serialize;

use crate::domain::ids::JobId;
use crate::domain::queue_name::QueueName;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued {
        queue: QueueName,
        job_id: JobId,
    },
    Claimed {
        queue: QueueName,
        job_id: JobId,
        attempts: u32,
    },
    Succeeded {
        queue: QueueName,
        job_id: JobId,
        result: serde_json::Value,
    },
    RetryScheduled {
        queue: QueueName,
        job_id: JobId,
        attempts: u32,
        #[serde(with = "millis")]
        delay: Duration,
        error: String,
    },
    Failed {
        queue: QueueName,
        job_id: JobId,
        attempts: u32,
        error: String,
    },
    /// An active job was reclaimed after its worker went quiet.
    Stalled {
        queue: QueueName,
        job_id: JobId,
        requeued: bool,
    },
    Retried {
        queue: QueueName,
        job_id: JobId,
    },
    Removed {
        queue: QueueName,
        job_id: JobId,
    },
    /// Dropped by the retention bound.
    Evicted {
        queue: QueueName,
        job_id: JobId,
    },
}

impl QueueEvent {
    pub fn queue(&self) -> QueueName {
        match self {
            QueueEvent::Enqueued { queue, .. }
            | QueueEvent::Claimed { queue, .. }
            | QueueEvent::Succeeded { queue, .. }
            | QueueEvent::RetryScheduled { queue, .. }
            | QueueEvent::Failed { queue, .. }
            | QueueEvent::Stalled { queue, .. }
            | QueueEvent::Retried { queue, .. }
            | QueueEvent::Removed { queue, .. }
            | QueueEvent::Evicted { queue, .. } => *queue,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            QueueEvent::Enqueued { job_id, .. }
            | QueueEvent::Claimed { job_id, .. }
            | QueueEvent::Succeeded { job_id, .. }
            | QueueEvent::RetryScheduled { job_id, .. }
            | QueueEvent::Failed { job_id, .. }
            | QueueEvent::Stalled { job_id, .. }
            | QueueEvent::Retried { job_id, .. }
            | QueueEvent::Removed { job_id, .. }
            | QueueEvent::Evicted { job_id, .. } => *job_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued { .. } => "enqueued",
            QueueEvent::Claimed { .. } => "claimed",
            QueueEvent::Succeeded { .. } => "succeeded",
            QueueEvent::RetryScheduled { .. } => "retry_scheduled",
            QueueEvent::Failed { .. } => "failed",
            QueueEvent::Stalled { .. } => "stalled",
            QueueEvent::Retried { .. } => "retried",
            QueueEvent::Removed { .. } => "removed",
            QueueEvent::Evicted { .. } => "evicted",
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
