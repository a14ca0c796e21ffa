//! WaitlistDirectory port - waitlist メンバーの読み取り専用ビュー
//!
//! 正本は周辺アプリの永続化層（ORM）にあり、このクレートは読むだけです。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::WaitlistEntry;

#[derive(Debug, Error)]
#[error("waitlist lookup failed: {0}")]
pub struct DirectoryError(pub String);

#[async_trait]
pub trait WaitlistDirectory: Send + Sync {
    /// All entries for an app, ordered by position.
    async fn entries(&self, app_slug: &str) -> Result<Vec<WaitlistEntry>, DirectoryError>;

    async fn find(&self, app_slug: &str, email: &str)
    -> Result<Option<WaitlistEntry>, DirectoryError>;

    async fn count(&self, app_slug: &str) -> Result<usize, DirectoryError> {
        Ok(self.entries(app_slug).await?.len())
    }
}
