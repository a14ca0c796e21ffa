//! Job identifiers.
//!
//! # ULID ベースの ID
//! Job ID は ULID をラップした newtype です。
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でおおよそ並ぶ
//! - **分散生成可能**: API プロセスと worker プロセスが調整なしで生成できる
//!
//! 表示形式は `job-<ULID>`。パース時はプレフィックス付き・なしの両方を受け付けます
//! （admin UI から素の ULID が送られてくることがあるため）。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::domain::errors::ValidationError;

const PREFIX: &str = "job-";

/// Identifier of a queued job.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Ulid);

impl JobId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw.strip_prefix(PREFIX).unwrap_or(raw);
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|_| ValidationError::InvalidJobId(s.to_string()))
    }
}

// 文字列として (de)serialize する。Redis のキーや admin API の jobId と同じ表現。
impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_job_prefix() {
        let ulid = Ulid::new();
        let id = JobId::from_ulid(ulid);
        assert_eq!(id.to_string(), format!("job-{ulid}"));
    }

    #[test]
    fn parses_prefixed_and_bare_forms() {
        let id = JobId::from_ulid(Ulid::new());
        let bare = id.as_ulid().to_string();

        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert_eq!(bare.parse::<JobId>().unwrap(), id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "job-not-a-ulid".parse::<JobId>().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidJobId(s) if s == "job-not-a-ulid"));
    }

    #[test]
    fn serializes_as_display_string() {
        let id = JobId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));

        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = JobId::from_ulid(Ulid::from_parts(1_000, 7));
        let id2 = JobId::from_ulid(Ulid::from_parts(2_000, 1));
        assert!(id1 < id2);
    }
}
