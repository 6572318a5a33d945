use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mailcast_schedule::{is_due, Schedule};

use crate::error::LifecycleError;

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("address regex"));

/// Minimal `local@domain.tld` shape check.
pub fn is_plausible_address(raw: &str) -> bool {
    ADDRESS.is_match(raw.trim())
}

/// Canonical ledger key for an address: trimmed and lowercased.
pub fn normalize_address(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Delivery state of a single recipient task. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Sent,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Sent => write!(f, "sent"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One row of intended correspondence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientTask {
    pub to: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub segment: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub weekday: String,
    pub subject: String,
    pub body: String,
    /// Raw date cell as uploaded.
    #[serde(default)]
    pub send_date: String,
    /// Raw time cell as uploaded.
    #[serde(default)]
    pub send_time: String,
    /// `scheduled_for` rendered in the target zone.
    pub display_time: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub scheduled_for: DateTime<Utc>,
    pub delay_hours: f64,
    pub status: TaskStatus,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Durable scheduled-delivery record backing this task, if it was
    /// deferred at upload time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
}

impl RecipientTask {
    /// A pending task with the given schedule; optional fields start empty.
    pub fn new(to: &str, subject: &str, body: &str, schedule: Schedule) -> Self {
        Self {
            to: to.trim().to_string(),
            name: String::new(),
            segment: String::new(),
            phase: String::new(),
            weekday: String::new(),
            subject: subject.to_string(),
            body: body.to_string(),
            send_date: String::new(),
            send_time: String::new(),
            display_time: schedule.display,
            scheduled_for: schedule.scheduled_for,
            delay_hours: schedule.delay_hours,
            status: TaskStatus::Pending,
            sent_at: None,
            error: None,
            record_id: None,
        }
    }

    pub fn address_key(&self) -> String {
        normalize_address(&self.to)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        is_due(self.scheduled_for, now)
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.ensure_pending()?;
        self.status = TaskStatus::Sent;
        self.sent_at = Some(at);
        self.error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), LifecycleError> {
        self.ensure_pending()?;
        self.status = TaskStatus::Failed;
        self.error = Some(reason.into());
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), LifecycleError> {
        if self.status.is_terminal() {
            return Err(LifecycleError::AlreadySettled {
                to: self.to.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}
