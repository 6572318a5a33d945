//! Per-address delivery history and the over-send guard built on it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mailcast_core::normalize_address;

use crate::duplicates::{find_batch_duplicates, BatchDuplicate};
use crate::error::StoreError;

/// How many subjects a record remembers, newest first.
pub const RECENT_SUBJECTS_CAP: usize = 5;

/// Cumulative send ledger entry for one normalized address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub address: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_sent_at: DateTime<Utc>,
    pub sent_count: u32,
    #[serde(default)]
    pub recent_subjects: Vec<String>,
}

impl HistoryRecord {
    pub fn first(address: &str, subject: &str, at: DateTime<Utc>) -> Self {
        Self {
            address: normalize_address(address),
            last_sent_at: at,
            sent_count: 1,
            recent_subjects: vec![subject.to_string()],
        }
    }

    /// Count one more send.
    pub fn bump(&mut self, subject: &str, at: DateTime<Utc>) {
        self.sent_count = self.sent_count.saturating_add(1);
        self.last_sent_at = at;
        self.recent_subjects.insert(0, subject.to_string());
        self.recent_subjects.truncate(RECENT_SUBJECTS_CAP);
    }
}

/// Keyed store of history records. Keys are normalized addresses.
///
/// `increment` must be atomic per address: two concurrent increments on the
/// same key both count.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn increment(
        &self,
        address: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> Result<HistoryRecord, StoreError>;

    /// Records for the given normalized addresses; unknown ones are omitted.
    async fn get_many(&self, addresses: &[String]) -> Result<Vec<HistoryRecord>, StoreError>;
}

/// One successful delivery to feed into the ledger.
#[derive(Debug, Clone)]
pub struct SendEntry {
    pub address: String,
    pub subject: String,
    pub at: DateTime<Utc>,
}

/// Addresses worth a second look before sending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OversendReport {
    /// Repeated more than the threshold within the current upload.
    pub batch_duplicates: Vec<BatchDuplicate>,
    /// Already sent at least the threshold number of times.
    pub over_limit: Vec<HistoryRecord>,
}

impl OversendReport {
    pub fn is_empty(&self) -> bool {
        self.batch_duplicates.is_empty() && self.over_limit.is_empty()
    }
}

/// Facade over a [`HistoryStore`]. Persistence failures are logged and
/// swallowed here; callers never see them.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn HistoryStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, address: &str, subject: &str, at: DateTime<Utc>) {
        let key = normalize_address(address);
        match self.store.increment(&key, subject, at).await {
            Ok(record) => debug!(address = %key, count = record.sent_count, "history recorded"),
            Err(e) => warn!(address = %key, error = %e, "failed to record send history"),
        }
    }

    /// Applied in order, so the last entry for an address sets its
    /// `last_sent_at` while every occurrence counts.
    pub async fn record_batch(&self, entries: &[SendEntry]) {
        for entry in entries {
            self.record(&entry.address, &entry.subject, entry.at).await;
        }
    }

    /// History records with `sent_count >= threshold`.
    pub async fn find_over_limit<S: AsRef<str>>(&self, addresses: &[S], threshold: u32) -> Vec<HistoryRecord> {
        self.lookup(addresses)
            .await
            .into_iter()
            .filter(|r| r.sent_count >= threshold)
            .collect()
    }

    /// Send count per known address. Addresses never sent to are absent.
    pub async fn counts_for<S: AsRef<str>>(&self, addresses: &[S]) -> HashMap<String, u32> {
        self.lookup(addresses)
            .await
            .into_iter()
            .map(|r| (r.address, r.sent_count))
            .collect()
    }

    /// Both over-send checks for an upload, kept apart: within-batch
    /// repeats (`> threshold`) and history (`>= threshold`).
    pub async fn oversend_report<S: AsRef<str>>(&self, addresses: &[S], threshold: u32) -> OversendReport {
        OversendReport {
            batch_duplicates: find_batch_duplicates(addresses.iter().map(AsRef::as_ref), threshold),
            over_limit: self.find_over_limit(addresses, threshold).await,
        }
    }

    async fn lookup<S: AsRef<str>>(&self, addresses: &[S]) -> Vec<HistoryRecord> {
        let mut keys: Vec<String> = addresses.iter().map(|a| normalize_address(a.as_ref())).collect();
        keys.sort();
        keys.dedup();
        match self.store.get_many(&keys).await {
            Ok(records) => records,
            Err(e) => {
                warn!(addresses = keys.len(), error = %e, "history lookup failed");
                Vec::new()
            }
        }
    }
}
