//! In-process store. Used when no durable backend is configured and in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use mailcast_core::Job;

use crate::error::StoreError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::jobs::JobStore;
use crate::scheduled::{select_due, RecordFilter, ScheduledDeliveryRecord, ScheduledStore, Settlement};

#[derive(Default)]
pub struct MemoryStore {
    history: Mutex<HashMap<String, HistoryRecord>>,
    scheduled: Mutex<HashMap<Uuid, ScheduledDeliveryRecord>>,
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn increment(
        &self,
        address: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> Result<HistoryRecord, StoreError> {
        let mut history = self.history.lock().expect("history lock poisoned");
        let record = history
            .entry(address.to_string())
            .and_modify(|r| r.bump(subject, at))
            .or_insert_with(|| HistoryRecord::first(address, subject, at));
        Ok(record.clone())
    }

    async fn get_many(&self, addresses: &[String]) -> Result<Vec<HistoryRecord>, StoreError> {
        let history = self.history.lock().expect("history lock poisoned");
        Ok(addresses.iter().filter_map(|a| history.get(a).cloned()).collect())
    }
}

#[async_trait]
impl ScheduledStore for MemoryStore {
    async fn insert(&self, record: ScheduledDeliveryRecord) -> Result<(), StoreError> {
        let mut scheduled = self.scheduled.lock().expect("scheduled lock poisoned");
        if scheduled.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("record {} already exists", record.id)));
        }
        scheduled.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ScheduledDeliveryRecord, StoreError> {
        let scheduled = self.scheduled.lock().expect("scheduled lock poisoned");
        scheduled
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("scheduled record {id}")))
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledDeliveryRecord>, StoreError> {
        let scheduled = self.scheduled.lock().expect("scheduled lock poisoned");
        Ok(select_due(scheduled.values(), now, limit))
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut scheduled = self.scheduled.lock().expect("scheduled lock poisoned");
        let record = scheduled
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("scheduled record {id}")))?;
        Ok(record.try_claim(now))
    }

    async fn settle(&self, id: Uuid, outcome: Settlement, now: DateTime<Utc>) -> Result<ScheduledDeliveryRecord, StoreError> {
        let mut scheduled = self.scheduled.lock().expect("scheduled lock poisoned");
        let record = scheduled
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("scheduled record {id}")))?;
        record.settle(&outcome, now)?;
        Ok(record.clone())
    }

    async fn delete_where(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        let mut scheduled = self.scheduled.lock().expect("scheduled lock poisoned");
        let before = scheduled.len();
        scheduled.retain(|_, r| !filter.matches(r));
        Ok(before - scheduled.len())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn save_merged(&self, job: &mut Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        if let Some(stored) = jobs.get(&job.id) {
            job.absorb(stored);
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Job, StoreError> {
        let jobs = self.jobs.lock().expect("jobs lock poisoned");
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        let jobs = self.jobs.lock().expect("jobs lock poisoned");
        let mut listed: Vec<(DateTime<Utc>, Uuid)> = jobs.values().map(|j| (j.created_at, j.id)).collect();
        listed.sort();
        Ok(listed.into_iter().map(|(_, id)| id).collect())
    }
}
