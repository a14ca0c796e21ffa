//! InMemoryMailTransport - 開発用・テスト用の送信箱
//!
//! 実際には送信せず、送った内容を記録します。
//! 宛先ごとに失敗を注入できるので、bulk 送信の部分失敗も再現できます。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::OutgoingEmail;
use crate::ports::{MailTransport, SendResult};

#[derive(Default)]
struct Outbox {
    sent: Vec<OutgoingEmail>,
    failures: HashMap<String, String>,
    next_id: u64,
}

#[derive(Default)]
pub struct InMemoryMailTransport {
    outbox: Mutex<Outbox>,
}

impl InMemoryMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to `to` fails with `error` until cleared.
    pub fn fail_for(&self, to: impl Into<String>, error: impl Into<String>) {
        self.lock().failures.insert(to.into(), error.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Messages delivered so far, in send order.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MailTransport for InMemoryMailTransport {
    async fn send(&self, email: &OutgoingEmail) -> SendResult {
        let mut outbox = self.lock();
        if let Some(error) = outbox.failures.get(&email.to) {
            return SendResult::failed(error.clone());
        }
        outbox.next_id += 1;
        let message_id = format!("<{}@herald.local>", outbox.next_id);
        outbox.sent.push(email.clone());
        tracing::debug!(to = email.to.as_str(), subject = email.template.subject.as_str(), "captured email");
        SendResult::sent(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmailTemplate;

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail::new(
            to,
            EmailTemplate {
                subject: "hi".into(),
                text: "hi".into(),
                html: "<p>hi</p>".into(),
            },
        )
    }

    #[tokio::test]
    async fn records_sent_messages() {
        let transport = InMemoryMailTransport::new();
        let result = transport.send(&email("a@b.com")).await;

        assert!(result.success);
        assert!(result.message_id.is_some());
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn bulk_send_continues_past_failures() {
        let transport = InMemoryMailTransport::new();
        transport.fail_for("bad@b.com", "mailbox unavailable");

        let report = transport
            .send_bulk(vec![email("a@b.com"), email("bad@b.com"), email("c@b.com")])
            .await;

        assert_eq!(report.success, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 3);
        assert_eq!(report.results[1].to, "bad@b.com");
        assert_eq!(
            report.results[1].result.error.as_deref(),
            Some("mailbox unavailable")
        );
        assert_eq!(transport.sent().len(), 2);
    }
}
