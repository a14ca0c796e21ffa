//! Job payloads as they travel through the store.
//!
//! Payloads are stored as raw JSON on the job. Workers decode them at
//! dispatch time, so a malformed or unknown payload fails that one job
//! instead of being rejected at enqueue.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::JobError;
use crate::domain::template::EmailTemplate;

/// App slug used by bulk updates that do not name one.
pub const DEFAULT_APP_SLUG: &str = "aela";

/// Payload of the `email` queue: a fully rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailJobData {
    pub to: String,
    pub template: EmailTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeEmailData {
    pub email: String,
    pub position: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmailData {
    pub email: String,
    pub position: u64,
    pub total_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_slug: Option<String>,
}

impl BulkUpdateData {
    pub fn app_slug(&self) -> &str {
        self.app_slug.as_deref().unwrap_or(DEFAULT_APP_SLUG)
    }
}

/// Payload of the `waitlist` queue: `{"type": <kind>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WaitlistJob {
    Welcome(WelcomeEmailData),
    Update(UpdateEmailData),
    BulkUpdate(BulkUpdateData),
}

impl WaitlistJob {
    pub const KINDS: [&'static str; 3] = ["welcome", "update", "bulk_update"];

    /// Decodes a stored payload, telling an unknown kind apart from a
    /// known kind with bad data.
    pub fn from_value(value: &Value) -> Result<Self, JobError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| JobError::InvalidPayload("missing job type".to_string()))?;

        if !Self::KINDS.contains(&kind) {
            return Err(JobError::UnknownJobKind(kind.to_string()));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| JobError::InvalidPayload(format!("json decode: {e}")))
    }
}

/// Job result of a `bulk_update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUpdateResult {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn waitlist_job_uses_type_and_data_envelope() {
        let job = WaitlistJob::Welcome(WelcomeEmailData {
            email: "a@b.com".into(),
            position: 5,
            total_count: 100,
        });

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "welcome",
                "data": {"email": "a@b.com", "position": 5, "totalCount": 100}
            })
        );
    }

    #[test]
    fn bulk_update_defaults_app_slug() {
        let job = WaitlistJob::from_value(&json!({
            "type": "bulk_update",
            "data": {"message": "hello"}
        }))
        .unwrap();

        let WaitlistJob::BulkUpdate(data) = job else {
            panic!("expected bulk update");
        };
        assert_eq!(data.app_slug(), "aela");
    }

    #[test]
    fn unknown_kind_is_distinguished_from_bad_data() {
        let unknown = WaitlistJob::from_value(&json!({"type": "digest", "data": {}}));
        assert!(matches!(unknown, Err(JobError::UnknownJobKind(k)) if k == "digest"));

        let bad = WaitlistJob::from_value(&json!({"type": "welcome", "data": {"email": 1}}));
        assert!(matches!(bad, Err(JobError::InvalidPayload(_))));

        let missing = WaitlistJob::from_value(&json!({"data": {}}));
        assert!(matches!(missing, Err(JobError::InvalidPayload(_))));
    }

    #[test]
    fn email_job_from_is_optional() {
        let data: EmailJobData = serde_json::from_value(json!({
            "to": "a@b.com",
            "template": {"subject": "s", "text": "t", "html": "<p>h</p>"}
        }))
        .unwrap();
        assert_eq!(data.from, None);
        assert_eq!(data.template.subject, "s");
    }
}
