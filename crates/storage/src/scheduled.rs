//! Durable projection of deferred recipient tasks.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use mailcast_core::RecipientTask;

use crate::error::StoreError;

/// How long a claim holds before the record is offered to dispatchers again.
pub const CLAIM_LEASE_SECS: i64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    /// Taken by one dispatcher. Nobody else may send it until the lease
    /// runs out.
    Claimed,
    Sent,
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Claimed => write!(f, "claimed"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Final outcome of a claimed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Sent { at: DateTime<Utc> },
    Failed { reason: String },
}

/// A not-yet-due task that any process can later discover and deliver.
/// Authoritative for the state of the task it was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDeliveryRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Position of the originating task in its job.
    pub task_index: usize,
    pub to: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub segment: String,
    #[serde(default)]
    pub phase: String,
    pub subject: String,
    pub body: String,
    pub display_time: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub scheduled_for: DateTime<Utc>,
    pub status: DeliveryStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub settled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScheduledDeliveryRecord {
    pub fn from_task(job_id: Uuid, task_index: usize, task: &RecipientTask, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            task_index,
            to: task.to.clone(),
            name: task.name.clone(),
            segment: task.segment.clone(),
            phase: task.phase.clone(),
            subject: task.subject.clone(),
            body: task.body.clone(),
            display_time: task.display_time.clone(),
            scheduled_for: task.scheduled_for,
            status: DeliveryStatus::Pending,
            created_at: now,
            claimed_at: None,
            settled_at: None,
            error: None,
        }
    }

    /// Claimed, but the claimant never settled within the lease.
    pub fn claim_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Claimed
            && self
                .claimed_at
                .map_or(true, |at| now - at >= Duration::seconds(CLAIM_LEASE_SECS))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for <= now && (self.status == DeliveryStatus::Pending || self.claim_expired(now))
    }

    /// Conditional `pending -> claimed`, also taking over an expired claim.
    /// False when someone else holds it.
    pub fn try_claim(&mut self, now: DateTime<Utc>) -> bool {
        match self.status {
            DeliveryStatus::Pending => {}
            DeliveryStatus::Claimed if self.claim_expired(now) => {
                warn!(id = %self.id, to = %self.to, "reclaiming delivery whose claim expired");
            }
            _ => return false,
        }
        self.status = DeliveryStatus::Claimed;
        self.claimed_at = Some(now);
        true
    }

    /// The outcome of a settled record, `None` while pending or claimed.
    pub fn settlement(&self) -> Option<Settlement> {
        match self.status {
            DeliveryStatus::Sent => Some(Settlement::Sent { at: self.settled_at.unwrap_or(self.scheduled_for) }),
            DeliveryStatus::Failed => Some(Settlement::Failed {
                reason: self.error.clone().unwrap_or_else(|| "failed".to_string()),
            }),
            DeliveryStatus::Pending | DeliveryStatus::Claimed => None,
        }
    }

    /// `claimed -> sent | failed`.
    pub fn settle(&mut self, outcome: &Settlement, now: DateTime<Utc>) -> Result<(), StoreError> {
        if self.status != DeliveryStatus::Claimed {
            return Err(StoreError::Conflict(format!(
                "record {} is {}, not claimed",
                self.id, self.status
            )));
        }
        match outcome {
            Settlement::Sent { at } => {
                self.status = DeliveryStatus::Sent;
                self.settled_at = Some(*at);
            }
            Settlement::Failed { reason } => {
                self.status = DeliveryStatus::Failed;
                self.settled_at = Some(now);
                self.error = Some(reason.clone());
            }
        }
        Ok(())
    }
}

/// Selector for bulk deletes. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub job_id: Option<Uuid>,
    pub status: Option<DeliveryStatus>,
}

impl RecordFilter {
    pub fn matches(&self, record: &ScheduledDeliveryRecord) -> bool {
        self.job_id.map_or(true, |id| record.job_id == id)
            && self.status.map_or(true, |s| record.status == s)
    }
}

#[async_trait]
pub trait ScheduledStore: Send + Sync {
    async fn insert(&self, record: ScheduledDeliveryRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<ScheduledDeliveryRecord, StoreError>;

    /// Pending (or lease-expired) records due at `now`, earliest first, at
    /// most `limit`.
    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledDeliveryRecord>, StoreError>;

    /// Atomic `pending -> claimed` as of `now`, see
    /// [`ScheduledDeliveryRecord::try_claim`]. `Ok(false)` means someone
    /// else holds or settled the record.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn settle(&self, id: Uuid, outcome: Settlement, now: DateTime<Utc>) -> Result<ScheduledDeliveryRecord, StoreError>;

    /// Remove every matching record, returning how many went.
    async fn delete_where(&self, filter: &RecordFilter) -> Result<usize, StoreError>;
}

/// Earliest-first due selection shared by the backends.
pub(crate) fn select_due<'a>(
    records: impl Iterator<Item = &'a ScheduledDeliveryRecord>,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<ScheduledDeliveryRecord> {
    let mut due: Vec<ScheduledDeliveryRecord> = records.filter(|r| r.is_due(now)).cloned().collect();
    due.sort_by_key(|r| (r.scheduled_for, r.created_at));
    due.truncate(limit);
    due
}
