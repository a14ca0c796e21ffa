//! SMTP mail transport (lettre).
//!
//! `secure = true` means implicit TLS (usually port 465); otherwise the
//! connection is upgraded with STARTTLS (usually port 587).

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use ulid::Ulid;

use crate::config::SmtpConfig;
use crate::domain::OutgoingEmail;
use crate::ports::{MailTransport, SendResult};

#[derive(Debug, Error)]
pub enum SmtpSetupError {
    #[error("smtp relay {host}: {source}")]
    Relay {
        host: String,
        #[source]
        source: lettre::transport::smtp::Error,
    },

    #[error("no sender address: set SMTP_FROM or SMTP_USER")]
    MissingSender,
}

pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_from: String,
    host: String,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpSetupError> {
        let relay_error = |source| SmtpSetupError::Relay {
            host: config.host.clone(),
            source,
        };

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(relay_error)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(relay_error)?
        };

        let mut builder = builder.port(config.port);
        if let (Some(user), Some(pass)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let default_from = config
            .default_from()
            .ok_or(SmtpSetupError::MissingSender)?
            .to_string();

        Ok(Self {
            transport: builder.build(),
            default_from,
            host: config.host.clone(),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<(Message, String), String> {
        let from = email.from.as_deref().unwrap_or(&self.default_from);
        let from: Mailbox = from
            .parse()
            .map_err(|e| format!("invalid from address {from}: {e}"))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| format!("invalid recipient {}: {e}", email.to))?;

        let domain = from.email.domain().to_string();
        let message_id = format!("<{}@{}>", Ulid::new(), domain);

        let body = MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(email.template.text.clone()),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(email.template.html.clone()),
            );

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(email.template.subject.clone())
            .message_id(Some(message_id.clone()))
            .multipart(body)
            .map_err(|e| format!("build message: {e}"))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, email: &OutgoingEmail) -> SendResult {
        let (message, message_id) = match self.build_message(email) {
            Ok(built) => built,
            Err(error) => return SendResult::failed(error),
        };

        match self.transport.send(message).await {
            Ok(_) => {
                tracing::info!(to = email.to.as_str(), message_id = message_id.as_str(), "email sent");
                SendResult::sent(message_id)
            }
            Err(e) => {
                tracing::warn!(to = email.to.as_str(), error = %e, "email send failed");
                SendResult::failed(e.to_string())
            }
        }
    }

    async fn verify(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::error!(host = self.host.as_str(), error = %e, "smtp connection check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmailTemplate;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            secure: false,
            user: Some("robot@example.com".into()),
            password: Some("secret".into()),
            from: None,
        }
    }

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail::new(
            to,
            EmailTemplate {
                subject: "Hello".into(),
                text: "plain".into(),
                html: "<p>html</p>".into(),
            },
        )
    }

    #[tokio::test]
    async fn builds_multipart_message_with_default_sender() {
        let transport = SmtpMailTransport::new(&config()).unwrap();
        let (message, message_id) = transport.build_message(&email("a@b.com")).unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: robot@example.com"));
        assert!(raw.contains("To: a@b.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(message_id.ends_with("@example.com>"));
    }

    #[tokio::test]
    async fn invalid_recipient_is_a_failed_result_not_an_error() {
        let transport = SmtpMailTransport::new(&config()).unwrap();
        let result = transport.send(&email("not an address")).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid recipient"));
    }

    #[test]
    fn requires_some_sender() {
        let mut config = config();
        config.user = None;
        assert!(matches!(
            SmtpMailTransport::new(&config),
            Err(SmtpSetupError::MissingSender)
        ));
    }
}
