//! Processor for the `waitlist` queue.
//!
//! # フロー
//! - `welcome` / `update`: テンプレートを描画して 1 通送る。送信失敗は job の失敗（retry 対象）
//! - `bulk_update`: app の全メンバーに個別の update メールを bulk 送信する。
//!   宛先ごとの失敗は件数として結果に残すだけで、job 自体は成功扱い
//!   （宛先単位の retry はしない）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::processor::JobProcessor;
use crate::domain::{
    BulkUpdateData, BulkUpdateResult, Job, JobError, OutgoingEmail, QueueName, UpdateEmailData,
    WaitlistJob, WelcomeEmailData,
};
use crate::email::WaitlistTemplates;
use crate::ports::{MailTransport, WaitlistDirectory};

pub struct WaitlistProcessor {
    transport: Arc<dyn MailTransport>,
    directory: Arc<dyn WaitlistDirectory>,
    templates: WaitlistTemplates,
}

impl WaitlistProcessor {
    pub fn new(transport: Arc<dyn MailTransport>, directory: Arc<dyn WaitlistDirectory>) -> Self {
        Self {
            transport,
            directory,
            templates: WaitlistTemplates::default(),
        }
    }

    pub fn with_templates(mut self, templates: WaitlistTemplates) -> Self {
        self.templates = templates;
        self
    }

    async fn welcome(&self, data: WelcomeEmailData) -> Result<Value, JobError> {
        let template = self.templates.welcome(&data);
        let result = self
            .transport
            .send(&OutgoingEmail::new(data.email.clone(), template))
            .await;
        if !result.success {
            return Err(JobError::Delivery(format!(
                "failed to send welcome email: {}",
                result.error.unwrap_or_default()
            )));
        }
        Ok(json!({
            "success": true,
            "email": data.email,
            "position": data.position,
            "messageId": result.message_id,
        }))
    }

    async fn update(&self, data: UpdateEmailData) -> Result<Value, JobError> {
        let template = self.templates.update(&data);
        let result = self
            .transport
            .send(&OutgoingEmail::new(data.email.clone(), template))
            .await;
        if !result.success {
            return Err(JobError::Delivery(format!(
                "failed to send update email: {}",
                result.error.unwrap_or_default()
            )));
        }
        Ok(json!({
            "success": true,
            "email": data.email,
            "position": data.position,
            "messageId": result.message_id,
        }))
    }

    async fn bulk_update(&self, data: BulkUpdateData) -> Result<Value, JobError> {
        let app_slug = data.app_slug();
        let entries = self
            .directory
            .entries(app_slug)
            .await
            .map_err(|e| JobError::Directory(e.0))?;

        if entries.is_empty() {
            tracing::info!(app_slug, "bulk update: no waitlist entries");
            return Ok(bulk_result(BulkUpdateResult::default()));
        }

        let total_count = entries.len() as u64;
        let emails: Vec<OutgoingEmail> = entries
            .into_iter()
            .map(|entry| {
                let template = self.templates.update(&UpdateEmailData {
                    email: entry.email.clone(),
                    position: entry.position,
                    total_count,
                    message: Some(data.message.clone()),
                });
                OutgoingEmail::new(entry.email, template)
            })
            .collect();

        let report = self.transport.send_bulk(emails).await;
        let result = BulkUpdateResult {
            processed: report.success,
            failed: report.failed,
            total: report.total(),
        };
        tracing::info!(
            app_slug,
            processed = result.processed,
            failed = result.failed,
            total = result.total,
            "bulk update sent"
        );
        Ok(bulk_result(result))
    }
}

fn bulk_result(result: BulkUpdateResult) -> Value {
    json!({
        "success": true,
        "processed": result.processed,
        "failed": result.failed,
        "total": result.total,
    })
}

#[async_trait]
impl JobProcessor for WaitlistProcessor {
    fn queue(&self) -> QueueName {
        QueueName::Waitlist
    }

    async fn process(&self, job: &Job) -> Result<Value, JobError> {
        match WaitlistJob::from_value(&job.data)? {
            WaitlistJob::Welcome(data) => self.welcome(data).await,
            WaitlistJob::Update(data) => self.update(data).await,
            WaitlistJob::BulkUpdate(data) => self.bulk_update(data).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobId;
    use crate::impls::{InMemoryMailTransport, InMemoryWaitlistDirectory};
    use chrono::Utc;
    use ulid::Ulid;

    struct Fixture {
        transport: Arc<InMemoryMailTransport>,
        directory: Arc<InMemoryWaitlistDirectory>,
        processor: WaitlistProcessor,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(InMemoryMailTransport::new());
        let directory = Arc::new(InMemoryWaitlistDirectory::new());
        let processor = WaitlistProcessor::new(transport.clone(), directory.clone());
        Fixture {
            transport,
            directory,
            processor,
        }
    }

    fn job(data: Value) -> Job {
        Job::new(
            JobId::from_ulid(Ulid::new()),
            QueueName::Waitlist,
            data,
            3,
            1,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn welcome_renders_and_sends() {
        let f = fixture();
        let result = f
            .processor
            .process(&job(json!({
                "type": "welcome",
                "data": {"email": "a@b.com", "position": 5, "totalCount": 100}
            })))
            .await
            .unwrap();

        assert_eq!(result["email"], "a@b.com");
        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].template.subject,
            "Welcome to Aela! You're #5 on the waitlist"
        );
    }

    #[tokio::test]
    async fn welcome_send_failure_is_retryable_delivery_error() {
        let f = fixture();
        f.transport.fail_for("a@b.com", "connection refused");

        let err = f
            .processor
            .process(&job(json!({
                "type": "welcome",
                "data": {"email": "a@b.com", "position": 5, "totalCount": 100}
            })))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to send welcome email: connection refused"
        );
    }

    #[tokio::test]
    async fn update_carries_message() {
        let f = fixture();
        f.processor
            .process(&job(json!({
                "type": "update",
                "data": {"email": "a@b.com", "position": 2, "totalCount": 10, "message": "Soon!"}
            })))
            .await
            .unwrap();

        let sent = f.transport.sent();
        assert!(sent[0].template.text.contains("Update: Soon!"));
    }

    #[tokio::test]
    async fn bulk_update_counts_partial_failures() {
        let f = fixture();
        let now = Utc::now();
        f.directory.join("one@x.com", "aela", now);
        f.directory.join("two@x.com", "aela", now);
        f.directory.join("three@x.com", "aela", now);
        f.transport.fail_for("one@x.com", "bounced");
        f.transport.fail_for("three@x.com", "bounced");

        let result = f
            .processor
            .process(&job(json!({
                "type": "bulk_update",
                "data": {"message": "We launched"}
            })))
            .await
            .unwrap();

        assert_eq!(result["processed"], 1);
        assert_eq!(result["failed"], 2);
        assert_eq!(result["total"], 3);

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "two@x.com");
        assert!(sent[0].template.text.contains("Position: #2"));
        assert!(sent[0].template.text.contains("Total waitlist: 3 people"));
    }

    #[tokio::test]
    async fn bulk_update_targets_the_named_app() {
        let f = fixture();
        let now = Utc::now();
        f.directory.join("a@x.com", "aela", now);
        f.directory.join("b@x.com", "other", now);

        let result = f
            .processor
            .process(&job(json!({
                "type": "bulk_update",
                "data": {"message": "hi", "appSlug": "other"}
            })))
            .await
            .unwrap();

        assert_eq!(result["processed"], 1);
        assert_eq!(f.transport.sent()[0].to, "b@x.com");
    }

    #[tokio::test]
    async fn bulk_update_with_no_entries_is_a_no_op() {
        let f = fixture();
        let result = f
            .processor
            .process(&job(json!({
                "type": "bulk_update",
                "data": {"message": "hello"}
            })))
            .await
            .unwrap();

        assert_eq!(result["processed"], 0);
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_kind_fails() {
        let f = fixture();
        let err = f
            .processor
            .process(&job(json!({"type": "digest", "data": {}})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown waitlist job type: digest");
    }
}
