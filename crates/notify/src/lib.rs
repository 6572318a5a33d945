//! Delivery for mailcast.
//!
//! This crate provides:
//! - `Mailer` trait with an SMTP implementation (`lettre`)
//! - Recipient verification (syntax, deny-list, MX over DNS-over-HTTPS)
//! - Minijinja personalisation and HTML/plain-text body pairing
//! - `Dispatcher` for paced, per-task delivery of a job
//! - `Poller` that delivers due scheduled records independently of any job

pub mod deliverability;
pub mod delivery;
pub mod dispatcher;
pub mod email;
pub mod poller;
pub mod templating;
pub mod traits;

pub use deliverability::{DeliverabilityChecker, DomainChecker, DohResolver, Verdict};
pub use delivery::{Courier, Envelope};
pub use dispatcher::{DispatchError, DispatchOptions, DispatchReport, Dispatcher, TaskOutcome};
pub use email::SmtpMailer;
pub use poller::{PollReport, Poller};
pub use traits::{MailError, Mailer, OutgoingMail};
