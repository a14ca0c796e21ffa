//! Producer - アプリケーションから job を積む入口
//!
//! enqueue は store への書き込みだけで返る（SMTP を待たない）。
//! `send_welcome_email_best_effort` は waitlist 登録などの呼び出し元を
//! キュー障害で失敗させないための版で、エラーはログに残して握りつぶす。

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{
    BulkUpdateData, EmailJobData, EmailTemplate, JobId, QueueName, StoreError, UpdateEmailData,
    WaitlistJob, WelcomeEmailData,
};
use crate::queue::JobStore;

#[derive(Clone)]
pub struct Producer {
    store: Arc<dyn JobStore>,
}

impl Producer {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Queue a pre-rendered email.
    pub async fn send_email(
        &self,
        to: impl Into<String>,
        template: EmailTemplate,
        from: Option<String>,
    ) -> Result<JobId, StoreError> {
        let data = EmailJobData {
            to: to.into(),
            template,
            from,
        };
        self.enqueue(QueueName::Email, &data).await
    }

    pub async fn send_welcome_email(
        &self,
        email: impl Into<String>,
        position: u64,
        total_count: u64,
    ) -> Result<JobId, StoreError> {
        let job = WaitlistJob::Welcome(WelcomeEmailData {
            email: email.into(),
            position,
            total_count,
        });
        self.enqueue(QueueName::Waitlist, &job).await
    }

    /// Like [`Producer::send_welcome_email`], but a store failure is logged
    /// and swallowed.
    pub async fn send_welcome_email_best_effort(
        &self,
        email: impl Into<String>,
        position: u64,
        total_count: u64,
    ) -> Option<JobId> {
        let email = email.into();
        match self
            .send_welcome_email(email.clone(), position, total_count)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(email = %email, error = %e, "could not queue welcome email");
                None
            }
        }
    }

    pub async fn send_update_email(
        &self,
        email: impl Into<String>,
        position: u64,
        total_count: u64,
        message: Option<String>,
    ) -> Result<JobId, StoreError> {
        let job = WaitlistJob::Update(UpdateEmailData {
            email: email.into(),
            position,
            total_count,
            message,
        });
        self.enqueue(QueueName::Waitlist, &job).await
    }

    /// Queue one `bulk_update` job; recipients are resolved when it runs.
    pub async fn send_bulk_update(
        &self,
        message: impl Into<String>,
        app_slug: Option<String>,
    ) -> Result<JobId, StoreError> {
        let job = WaitlistJob::BulkUpdate(BulkUpdateData {
            message: message.into(),
            app_slug,
        });
        self.enqueue(QueueName::Waitlist, &job).await
    }

    async fn enqueue<T: Serialize>(&self, queue: QueueName, data: &T) -> Result<JobId, StoreError> {
        let data = serde_json::to_value(data)?;
        let job = self.store.enqueue(queue, data).await?;
        tracing::debug!(queue = queue.as_str(), job_id = %job.id, "job queued");
        Ok(job.id)
    }
}
