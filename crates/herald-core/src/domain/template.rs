use serde::{Deserialize, Serialize};

/// Rendered email content. Produced once per dispatch, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// A message ready for the mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    /// Overrides the transport's default sender.
    pub from: Option<String>,
    pub template: EmailTemplate,
}

impl OutgoingEmail {
    pub fn new(to: impl Into<String>, template: EmailTemplate) -> Self {
        Self {
            to: to.into(),
            from: None,
            template,
        }
    }

    pub fn with_from(mut self, from: Option<String>) -> Self {
        self.from = from;
        self
    }
}
