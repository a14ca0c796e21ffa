//! QueueRuntime - worker group と reaper をまとめて起動・停止する
//!
//! # 使用例
//! ```ignore
//! let runtime = QueueRuntime::start(store, registry, &config.worker)?;
//! // ...
//! runtime.shutdown().await;
//! ```
//!
//! 起動時に全キューの processor が揃っているかを確認する（不足があれば起動しない）。

use std::sync::Arc;
use std::time::Duration;

use super::processor::ProcessorRegistry;
use super::reaper_loop::ReaperLoop;
use super::worker::{WorkerGroup, WorkerOptions};
use crate::config::WorkerConfig;
use crate::domain::QueueName;
use crate::queue::JobStore;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("missing processors for queues: {0:?}")]
    MissingProcessors(Vec<QueueName>),
}

pub struct QueueRuntime {
    groups: Vec<WorkerGroup>,
    reaper: ReaperLoop,
}

impl QueueRuntime {
    pub fn start(
        store: Arc<dyn JobStore>,
        registry: ProcessorRegistry,
        config: &WorkerConfig,
    ) -> Result<Self, RuntimeError> {
        let missing: Vec<QueueName> = QueueName::ALL
            .into_iter()
            .filter(|queue| registry.get(*queue).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(RuntimeError::MissingProcessors(missing));
        }

        let mut groups = Vec::new();
        for queue in registry.queues() {
            let Some(processor) = registry.get(queue) else {
                continue;
            };
            groups.push(WorkerGroup::spawn(
                queue,
                Arc::clone(&store),
                processor,
                WorkerOptions {
                    concurrency: config.concurrency(queue),
                    poll_interval: config.poll_interval,
                    error_backoff: config.poll_interval.max(Duration::from_secs(1)),
                },
            ));
        }

        let reaper = ReaperLoop::spawn(store, registry.queues(), config.reap_interval);
        tracing::info!("queue runtime started");
        Ok(Self { groups, reaper })
    }

    /// Stops claiming on every queue, waits for in-flight jobs, then stops the reaper.
    pub async fn shutdown(self) {
        for group in &self.groups {
            group.request_shutdown();
        }
        for group in self.groups {
            group.shutdown_and_join().await;
        }
        self.reaper.shutdown_and_join().await;
        tracing::info!("queue runtime stopped");
    }
}
