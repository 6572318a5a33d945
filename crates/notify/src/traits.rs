//! Mailer trait definition and shared error types.

use mailcast_core::SenderConfig;

/// Errors that can occur during mail delivery.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Message build failed: {0}")]
    Build(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template rendering failed: {0}")]
    Template(String),
}

/// A fully rendered message for one recipient.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OutgoingMail {
    pub to: String,
    /// Display name for the To header; empty for a bare address.
    pub to_name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Mail transport capability.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message using `sender`'s server and identity.
    async fn send(&self, sender: &SenderConfig, mail: &OutgoingMail) -> Result<(), MailError>;

    /// Human-readable name for this transport (e.g., "smtp").
    fn channel_name(&self) -> &str;
}
