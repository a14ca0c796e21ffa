//! JobProcessor と ProcessorRegistry
//!
//! 1 つのキューにつき 1 つの processor を登録します。
//! worker は claim した job のキュー名で processor を引いて実行します。
//!
//! # 使用例
//! ```ignore
//! let mut registry = ProcessorRegistry::new();
//! registry.register(Arc::new(EmailProcessor::new(transport.clone())))?;
//! registry.register(Arc::new(WaitlistProcessor::new(transport, directory)))?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Job, JobError, QueueName};

/// Executes jobs of one queue.
///
/// `Ok` carries the job result stored on success; `Err` consumes one
/// attempt and goes through the queue's retry policy.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    fn queue(&self) -> QueueName;

    async fn process(&self, job: &Job) -> Result<Value, JobError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("processor for queue '{0}' is already registered")]
    AlreadyRegistered(QueueName),
}

#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<QueueName, Arc<dyn JobProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn JobProcessor>) -> Result<(), RegistryError> {
        let queue = processor.queue();
        if self.processors.contains_key(&queue) {
            return Err(RegistryError::AlreadyRegistered(queue));
        }
        self.processors.insert(queue, processor);
        Ok(())
    }

    pub fn get(&self, queue: QueueName) -> Option<Arc<dyn JobProcessor>> {
        self.processors.get(&queue).cloned()
    }

    /// Registered queues in a stable order.
    pub fn queues(&self) -> Vec<QueueName> {
        let mut queues: Vec<QueueName> = self.processors.keys().copied().collect();
        queues.sort();
        queues
    }
}
