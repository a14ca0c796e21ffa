//! MailTransport port - 外部メールリレーへの送信
//!
//! # 設計原則
//! - `send` は `Result` を返さない。失敗は `SendResult { success: false, .. }` として返す
//! - 失敗を retry 対象の error にするかどうかは呼び出し側（processor）が決める
//! - `send_bulk` は 1 件の失敗でバッチを中断しない

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::OutgoingEmail;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientResult {
    pub to: String,
    #[serde(flatten)]
    pub result: SendResult,
}

/// Per-recipient results plus aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSendReport {
    pub success: usize,
    pub failed: usize,
    pub results: Vec<RecipientResult>,
}

impl BulkSendReport {
    pub fn push(&mut self, to: String, result: SendResult) {
        if result.success {
            self.success += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(RecipientResult { to, result });
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> SendResult;

    /// Sends each message independently, in order.
    async fn send_bulk(&self, emails: Vec<OutgoingEmail>) -> BulkSendReport {
        let mut report = BulkSendReport::default();
        for email in emails {
            let result = self.send(&email).await;
            report.push(email.to, result);
        }
        report
    }

    /// Connection self-test.
    async fn verify(&self) -> bool {
        true
    }
}
