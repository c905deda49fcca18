//! SMTP delivery of decision emails.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::MailError;
use crate::services::{DecisionMessage, Mailer, SendReport, SkipReason};

/// Connection settings for the outbound SMTP relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Implicit TLS from the first byte (usually port 465); otherwise STARTTLS.
    pub secure: bool,
    /// Sender, e.g. `CB Food Portal <no-reply@klu.ac.in>`.
    pub from: String,
}

/// Mailer that delivers through an authenticated SMTP relay.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Builds the transport. No connection is made until the first send.
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|e| MailError::Config(format!("invalid sender {:?}: {e}", settings.from)))?;

        let builder = if settings.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|e| MailError::Config(e.to_string()))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.user.clone(),
                settings.pass.clone(),
            ))
            .build();

        Ok(Self { from, transport })
    }
}

/// Assembles a multipart (plain text + HTML) message.
pub(crate) fn build_message(
    from: &Mailbox,
    to: Mailbox,
    message: &DecisionMessage,
) -> Result<Message, MailError> {
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            message.text.clone(),
            message.html.clone(),
        ))
        .map_err(|e| MailError::Transport(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &DecisionMessage) -> Result<SendReport, MailError> {
        if message.to.is_empty() {
            return Ok(SendReport::Skipped(SkipReason::MissingRecipient));
        }
        let Ok(to) = message.to.parse::<Mailbox>() else {
            return Ok(SendReport::Skipped(SkipReason::InvalidRecipient));
        };

        let email = build_message(&self.from, to, message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!(
            order_id = %message.order_id,
            to = %message.to,
            subject = %message.subject,
            "decision email sent"
        );
        Ok(SendReport::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{DecisionType, OrderId};

    fn message() -> DecisionMessage {
        DecisionMessage {
            order_id: OrderId::new(),
            kind: DecisionType::Verified,
            to: "lead@klu.ac.in".to_string(),
            subject: "CB Food Portal - Ticket Confirmed".to_string(),
            text: "Payment Verified".to_string(),
            html: "<h1>Payment Verified</h1>".to_string(),
        }
    }

    #[test]
    fn message_carries_both_bodies() {
        let from: Mailbox = "CB Food Portal <no-reply@klu.ac.in>".parse().unwrap();
        let to: Mailbox = "lead@klu.ac.in".parse().unwrap();

        let email = build_message(&from, to, &message()).unwrap();
        let raw = String::from_utf8_lossy(&email.formatted()).to_string();
        assert!(raw.contains("To: lead@klu.ac.in"));
        assert!(raw.contains("Subject: CB Food Portal - Ticket Confirmed"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn invalid_sender_is_a_config_error() {
        let settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: "portal".to_string(),
            pass: "secret".to_string(),
            secure: false,
            from: "not an address".to_string(),
        };
        assert!(matches!(SmtpMailer::new(&settings), Err(MailError::Config(_))));
    }
}
