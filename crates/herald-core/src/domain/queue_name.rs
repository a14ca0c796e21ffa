//! Named queues.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// The fixed set of queues. A job keeps its queue for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    /// Pre-rendered messages, sent as-is.
    Email,
    /// Waitlist notifications rendered inside the worker.
    Waitlist,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Email, QueueName::Waitlist];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Email => "email",
            QueueName::Waitlist => "waitlist",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(QueueName::Email),
            "waitlist" => Ok(QueueName::Waitlist),
            other => Err(ValidationError::UnknownQueue(other.to_string())),
        }
    }
}
