//! Processor for the `email` queue: the payload is already rendered.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::processor::JobProcessor;
use crate::domain::{EmailJobData, Job, JobError, OutgoingEmail, QueueName};
use crate::ports::MailTransport;

pub struct EmailProcessor {
    transport: Arc<dyn MailTransport>,
}

impl EmailProcessor {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl JobProcessor for EmailProcessor {
    fn queue(&self) -> QueueName {
        QueueName::Email
    }

    async fn process(&self, job: &Job) -> Result<Value, JobError> {
        let data: EmailJobData = serde_json::from_value(job.data.clone())
            .map_err(|e| JobError::InvalidPayload(format!("json decode: {e}")))?;

        let email = OutgoingEmail::new(data.to, data.template).with_from(data.from);
        let result = self.transport.send(&email).await;
        if !result.success {
            return Err(JobError::Delivery(
                result
                    .error
                    .unwrap_or_else(|| "failed to send email".to_string()),
            ));
        }

        Ok(json!({
            "success": true,
            "messageId": result.message_id,
        }))
    }
}
