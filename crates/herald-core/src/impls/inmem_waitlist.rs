//! InMemoryWaitlistDirectory - 開発用の waitlist
//!
//! 本番では周辺アプリが ORM ベースの `WaitlistDirectory` を実装して差し込みます。
//! ここでは JSON ファイル（`WaitlistEntry` の配列）から読み込めるようにしています。

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::WaitlistEntry;
use crate::ports::{DirectoryError, WaitlistDirectory};

#[derive(Default)]
pub struct InMemoryWaitlistDirectory {
    entries: Mutex<Vec<WaitlistEntry>>,
}

impl InMemoryWaitlistDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<WaitlistEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError(format!("read {}: {e}", path.display())))?;
        let entries: Vec<WaitlistEntry> = serde_json::from_str(&raw)
            .map_err(|e| DirectoryError(format!("parse {}: {e}", path.display())))?;
        Ok(Self::with_entries(entries))
    }

    /// Appends a member at the next position for `app_slug`.
    pub fn join(&self, email: &str, app_slug: &str, created_at: DateTime<Utc>) -> WaitlistEntry {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let position = entries
            .iter()
            .filter(|e| e.app_slug == app_slug)
            .map(|e| e.position)
            .max()
            .unwrap_or(0)
            + 1;
        let entry = WaitlistEntry {
            email: email.to_string(),
            position,
            app_slug: app_slug.to_string(),
            created_at,
        };
        entries.push(entry.clone());
        entry
    }
}

#[async_trait]
impl WaitlistDirectory for InMemoryWaitlistDirectory {
    async fn entries(&self, app_slug: &str) -> Result<Vec<WaitlistEntry>, DirectoryError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<WaitlistEntry> = entries
            .iter()
            .filter(|e| e.app_slug == app_slug)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.position);
        Ok(matching)
    }

    async fn find(
        &self,
        app_slug: &str,
        email: &str,
    ) -> Result<Option<WaitlistEntry>, DirectoryError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .find(|e| e.app_slug == app_slug && e.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn join_assigns_positions_per_app() {
        let dir = InMemoryWaitlistDirectory::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(dir.join("a@b.com", "aela", at).position, 1);
        assert_eq!(dir.join("c@d.com", "aela", at).position, 2);
        assert_eq!(dir.join("e@f.com", "other", at).position, 1);

        let entries = dir.entries("aela").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(dir.count("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_ignores_case() {
        let dir = InMemoryWaitlistDirectory::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        dir.join("Person@Example.com", "aela", at);

        let found = dir.find("aela", "person@example.com").await.unwrap();
        assert_eq!(found.map(|e| e.position), Some(1));
        assert!(dir.find("other", "person@example.com").await.unwrap().is_none());
    }

    #[test]
    fn missing_seed_file_is_an_error() {
        let err = InMemoryWaitlistDirectory::from_json_file("/nonexistent/waitlist.json");
        assert!(err.is_err());
    }
}
