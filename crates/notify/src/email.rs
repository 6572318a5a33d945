//! SMTP mailer via `lettre` with TLS support.
//!
//! Each message goes out as `multipart/alternative` (plain text + HTML).
//! Port 465 uses implicit TLS; other ports use STARTTLS unless TLS is off.

use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use mailcast_core::SenderConfig;

use crate::traits::{MailError, Mailer, OutgoingMail};

const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends mail through the SMTP server named in each call's sender config.
#[derive(Debug, Default)]
pub struct SmtpMailer {
    _private: (),
}

impl SmtpMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the async transport for `sender`.
    pub fn transport(sender: &SenderConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let host = sender
            .smtp_host
            .as_deref()
            .ok_or_else(|| MailError::Config("SMTP host is not set".to_string()))?;
        let port = sender.smtp_port;

        let mut builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Config(e.to_string()))?
                .port(port)
        } else if sender.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Some(username), Some(password)) = (&sender.username, &sender.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    /// Build the MIME message: From carries the sender's display name.
    pub fn build_message(sender: &SenderConfig, mail: &OutgoingMail) -> Result<Message, MailError> {
        let from_address = sender
            .from_address
            .as_deref()
            .ok_or_else(|| MailError::Config("sender address is not set".to_string()))?;
        let from = Mailbox::new(
            sender.from_name.clone().filter(|n| !n.is_empty()),
            from_address
                .parse()
                .map_err(|e: lettre::address::AddressError| MailError::Config(e.to_string()))?,
        );
        let to = Mailbox::new(
            Some(mail.to_name.clone()).filter(|n| !n.is_empty()),
            mail.to
                .trim()
                .parse()
                .map_err(|e: lettre::address::AddressError| MailError::Build(e.to_string()))?,
        );

        Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .multipart(MultiPart::alternative_plain_html(mail.text.clone(), mail.html.clone()))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, sender: &SenderConfig, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = Self::build_message(sender, mail)?;
        let transport = Self::transport(sender)?;

        transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        tracing::debug!(channel = "smtp", to = %mail.to, subject = %mail.subject, "message accepted");
        Ok(())
    }

    /// Returns `"smtp"`.
    fn channel_name(&self) -> &str {
        "smtp"
    }
}
