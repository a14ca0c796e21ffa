use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A waitlist member, owned by the surrounding application's persistence
/// layer. Read-only input here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    pub email: String,
    pub position: u64,
    pub app_slug: String,
    pub created_at: DateTime<Utc>,
}
