//! EventSink の実装
//!
//! - **TracingEventSink**: 構造化ログとして出力（本番のデフォルト）
//! - **BroadcastEventSink**: tokio broadcast でプロセス内の購読者に配る
//! - **NoopEventSink**: 何もしない

use tokio::sync::broadcast;

use crate::domain::QueueEvent;
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &QueueEvent) {}
}

/// Logs lifecycle events: debug for routine steps, warn for retries,
/// error for terminal failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &QueueEvent) {
        let queue = event.queue().as_str();
        let job_id = event.job_id();
        match event {
            QueueEvent::Enqueued { .. } | QueueEvent::Claimed { .. } | QueueEvent::Evicted { .. } => {
                tracing::debug!(queue, %job_id, event = event.name(), "job event");
            }
            QueueEvent::Succeeded { .. } => {
                tracing::info!(queue, %job_id, "job completed");
            }
            QueueEvent::RetryScheduled {
                attempts,
                delay,
                error,
                ..
            } => {
                tracing::warn!(
                    queue,
                    %job_id,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = error.as_str(),
                    "job failed, retry scheduled"
                );
            }
            QueueEvent::Failed {
                attempts, error, ..
            } => {
                tracing::error!(
                    queue,
                    %job_id,
                    attempts,
                    error = error.as_str(),
                    "job failed permanently"
                );
            }
            QueueEvent::Stalled { requeued, .. } => {
                tracing::warn!(queue, %job_id, requeued, "stalled job reclaimed");
            }
            QueueEvent::Retried { .. } | QueueEvent::Removed { .. } => {
                tracing::info!(queue, %job_id, event = event.name(), "admin action");
            }
        }
    }
}

/// Publishes events on a broadcast channel.
///
/// Slow subscribers lose the oldest events; the store never waits on them.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<QueueEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: &QueueEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event.clone());
    }
}
