use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use mailcast_core::{Job, StorageConfig, StoreBackend};

use crate::error::StoreError;
use crate::file::FileStore;
use crate::history::{HistoryStore, Ledger};
use crate::jobs::JobStore;
use crate::memory::MemoryStore;
use crate::scheduled::{ScheduledDeliveryRecord, ScheduledStore};

/// Store handle built once at startup and passed to every component.
///
/// `Memory` is the "not configured" variant: everything works within the
/// process, nothing is durable.
#[derive(Clone)]
pub enum StoreHandle {
    Memory(Arc<MemoryStore>),
    File(Arc<FileStore>),
}

impl StoreHandle {
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Memory => {
                info!("Storage: in-memory store (not durable)");
                Ok(Self::memory())
            }
            StoreBackend::File => Self::file(&config.data_dir).await,
        }
    }

    /// File-backed store under `data_dir`. Several handles, in one process
    /// or many, may share a directory.
    pub async fn file(data_dir: &Path) -> Result<Self, StoreError> {
        Ok(StoreHandle::File(Arc::new(FileStore::open(data_dir).await?)))
    }

    pub fn memory() -> Self {
        StoreHandle::Memory(Arc::new(MemoryStore::new()))
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, StoreHandle::File(_))
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        match self {
            StoreHandle::Memory(s) => s.clone(),
            StoreHandle::File(s) => s.clone(),
        }
    }

    pub fn scheduled(&self) -> Arc<dyn ScheduledStore> {
        match self {
            StoreHandle::Memory(s) => s.clone(),
            StoreHandle::File(s) => s.clone(),
        }
    }

    pub fn jobs(&self) -> Arc<dyn JobStore> {
        match self {
            StoreHandle::Memory(s) => s.clone(),
            StoreHandle::File(s) => s.clone(),
        }
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.history())
    }

    /// Persist a freshly parsed job. Every task not yet due at `now` gets a
    /// durable scheduled record, linked through `record_id`.
    ///
    /// A record that cannot be written is logged and the task stays
    /// dispatchable from the job alone. Returns the number of deferred tasks.
    pub async fn submit_job(&self, job: &mut Job, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let scheduled = self.scheduled();
        let mut deferred = 0;
        for (index, task) in job.tasks.iter_mut().enumerate() {
            if task.is_due(now) {
                continue;
            }
            let record = ScheduledDeliveryRecord::from_task(job.id, index, task, now);
            let record_id = record.id;
            match scheduled.insert(record).await {
                Ok(()) => {
                    task.record_id = Some(record_id);
                    deferred += 1;
                }
                Err(e) => warn!(job_id = %job.id, to = %task.to, error = %e, "failed to persist scheduled delivery"),
            }
        }
        self.jobs().save(job).await?;
        info!(job_id = %job.id, tasks = job.tasks.len(), deferred, "job submitted");
        Ok(deferred)
    }
}
