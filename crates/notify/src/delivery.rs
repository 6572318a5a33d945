//! One recipient, one message: verification, personalisation, transport.

use std::sync::Arc;

use mailcast_core::{Config, RecipientTask, SenderConfig};
use mailcast_storage::ScheduledDeliveryRecord;

use crate::deliverability::{DeliverabilityChecker, DomainChecker, LookupError, Verdict};
use crate::email::SmtpMailer;
use crate::templating::{render_bodies, RecipientContext, TemplateRenderer};
use crate::traits::{MailError, Mailer, OutgoingMail};

/// The per-recipient fields a send needs, whether they come from a live job
/// or a durable record.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: String,
    pub name: String,
    pub segment: String,
    pub phase: String,
    pub subject: String,
    pub body: String,
}

impl From<&RecipientTask> for Envelope {
    fn from(task: &RecipientTask) -> Self {
        Self {
            to: task.to.clone(),
            name: task.name.clone(),
            segment: task.segment.clone(),
            phase: task.phase.clone(),
            subject: task.subject.clone(),
            body: task.body.clone(),
        }
    }
}

impl From<&ScheduledDeliveryRecord> for Envelope {
    fn from(record: &ScheduledDeliveryRecord) -> Self {
        Self {
            to: record.to.clone(),
            name: record.name.clone(),
            segment: record.segment.clone(),
            phase: record.phase.clone(),
            subject: record.subject.clone(),
            body: record.body.clone(),
        }
    }
}

impl Envelope {
    fn context(&self) -> RecipientContext {
        RecipientContext {
            name: self.name.clone(),
            email: self.to.trim().to_string(),
            segment: self.segment.clone(),
            phase: self.phase.clone(),
        }
    }
}

/// Shared by the dispatcher and the poller.
#[derive(Clone)]
pub struct Courier {
    mailer: Arc<dyn Mailer>,
    checker: Option<Arc<dyn DeliverabilityChecker>>,
}

impl Courier {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer, checker: None }
    }

    /// SMTP transport, plus DNS verification when `VERIFY_RECIPIENTS` is on.
    pub fn from_config(config: &Config) -> Result<Self, LookupError> {
        let courier = Self::new(Arc::new(SmtpMailer::new()));
        if !config.dispatch.verify_recipients {
            return Ok(courier);
        }
        let checker = DomainChecker::from_config(&config.deliverability)?;
        Ok(courier.with_checker(Arc::new(checker)))
    }

    pub fn with_checker(mut self, checker: Arc<dyn DeliverabilityChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn channel_name(&self) -> &str {
        self.mailer.channel_name()
    }

    /// Without a checker every address passes.
    pub async fn verify(&self, address: &str) -> Verdict {
        match &self.checker {
            Some(checker) => checker.check(address).await,
            None => Verdict::valid(),
        }
    }

    /// Personalise and render the message for `envelope`.
    pub fn compose(&self, envelope: &Envelope) -> OutgoingMail {
        let renderer = TemplateRenderer::new();
        let ctx = envelope.context();
        let subject = renderer.render_or_raw(&envelope.subject, &ctx);
        let (html, text) = render_bodies(&envelope.body, &ctx);
        OutgoingMail {
            to: ctx.email,
            to_name: envelope.name.clone(),
            subject,
            html,
            text,
        }
    }

    pub async fn send(&self, sender: &SenderConfig, envelope: &Envelope) -> Result<(), MailError> {
        let mail = self.compose(envelope);
        self.mailer.send(sender, &mail).await
    }
}
