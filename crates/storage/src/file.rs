//! JSON-file store under a data directory.
//!
//! Layout:
//! - `{data_dir}/history.json`: address → record map
//! - `{data_dir}/scheduled.json`: array of scheduled delivery records
//! - `{data_dir}/jobs/{id}.json`: one file per job
//! - `{data_dir}/.lock`: advisory lock shared by every process on the directory
//!
//! Every mutation is a load-modify-write holding the in-process lock and an
//! exclusive `flock` on `.lock`, so several processes can share one data
//! directory. Files are replaced through a uniquely named temp file and a
//! rename, which keeps lock-free reads consistent.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use mailcast_core::Job;

use crate::error::StoreError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::jobs::JobStore;
use crate::scheduled::{select_due, RecordFilter, ScheduledDeliveryRecord, ScheduledStore, Settlement};

const HISTORY_FILE: &str = "history.json";
const SCHEDULED_FILE: &str = "scheduled.json";
const JOBS_DIR: &str = "jobs";
const LOCK_FILE: &str = ".lock";

pub struct FileStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create the data directory (and `jobs/`) if needed.
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(data_dir.join(JOBS_DIR)).await?;
        info!("Storage: file store at {}", data_dir.display());
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    fn scheduled_path(&self) -> PathBuf {
        self.data_dir.join(SCHEDULED_FILE)
    }

    fn job_path(&self, id: Uuid) -> PathBuf {
        job_path(&self.data_dir, id)
    }

    async fn load_history(&self) -> Result<BTreeMap<String, HistoryRecord>, StoreError> {
        read_json_or_default(&self.history_path()).await
    }

    async fn load_scheduled(&self) -> Result<Vec<ScheduledDeliveryRecord>, StoreError> {
        read_json_or_default(&self.scheduled_path()).await
    }

    /// Run `f` on a blocking thread while holding the directory lock.
    async fn exclusive<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, StoreError> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let data_dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(data_dir.join(LOCK_FILE))?;
            let mut lock = RwLock::new(file);
            let _held = lock.write()?;
            f(&data_dir)
        })
        .await
        .map_err(|e| StoreError::Io(io::Error::other(e)))?
    }

    /// Load scheduled records, let `f` mutate them, write back.
    async fn update_scheduled<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Vec<ScheduledDeliveryRecord>) -> Result<T, StoreError> + Send + 'static,
    {
        self.exclusive(move |dir| {
            let path = dir.join(SCHEDULED_FILE);
            let mut records: Vec<ScheduledDeliveryRecord> = read_json_blocking(&path)?.unwrap_or_default();
            let out = f(&mut records)?;
            write_json_blocking(&path, &records)?;
            Ok(out)
        })
        .await
    }
}

fn job_path(data_dir: &Path, id: Uuid) -> PathBuf {
    data_dir.join(JOBS_DIR).join(format!("{id}.json"))
}

async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(T::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// `None` when the file is missing or empty.
fn read_json_blocking<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(None),
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json_blocking<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    debug!(path = %path.display(), "persisted");
    Ok(())
}

fn not_found(id: Uuid) -> StoreError {
    StoreError::NotFound(format!("scheduled record {id}"))
}

#[async_trait]
impl HistoryStore for FileStore {
    async fn increment(
        &self,
        address: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> Result<HistoryRecord, StoreError> {
        let address = address.to_string();
        let subject = subject.to_string();
        self.exclusive(move |dir| {
            let path = dir.join(HISTORY_FILE);
            let mut history: BTreeMap<String, HistoryRecord> = read_json_blocking(&path)?.unwrap_or_default();
            let record = history
                .entry(address.clone())
                .and_modify(|r| r.bump(&subject, at))
                .or_insert_with(|| HistoryRecord::first(&address, &subject, at))
                .clone();
            write_json_blocking(&path, &history)?;
            Ok(record)
        })
        .await
    }

    async fn get_many(&self, addresses: &[String]) -> Result<Vec<HistoryRecord>, StoreError> {
        let history = self.load_history().await?;
        Ok(addresses.iter().filter_map(|a| history.get(a).cloned()).collect())
    }
}

#[async_trait]
impl ScheduledStore for FileStore {
    async fn insert(&self, record: ScheduledDeliveryRecord) -> Result<(), StoreError> {
        self.update_scheduled(move |records| {
            if records.iter().any(|r| r.id == record.id) {
                return Err(StoreError::Conflict(format!("record {} already exists", record.id)));
            }
            records.push(record);
            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<ScheduledDeliveryRecord, StoreError> {
        self.load_scheduled()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(id))
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledDeliveryRecord>, StoreError> {
        let records = self.load_scheduled().await?;
        Ok(select_due(records.iter(), now, limit))
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.update_scheduled(move |records| {
            records
                .iter_mut()
                .find(|r| r.id == id)
                .map(|r| r.try_claim(now))
                .ok_or_else(|| not_found(id))
        })
        .await
    }

    async fn settle(&self, id: Uuid, outcome: Settlement, now: DateTime<Utc>) -> Result<ScheduledDeliveryRecord, StoreError> {
        self.update_scheduled(move |records| {
            let record = records.iter_mut().find(|r| r.id == id).ok_or_else(|| not_found(id))?;
            record.settle(&outcome, now)?;
            Ok(record.clone())
        })
        .await
    }

    async fn delete_where(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        let filter = filter.clone();
        self.update_scheduled(move |records| {
            let before = records.len();
            records.retain(|r| !filter.matches(r));
            Ok(before - records.len())
        })
        .await
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let job = job.clone();
        self.exclusive(move |dir| write_json_blocking(&job_path(dir, job.id), &job)).await
    }

    async fn save_merged(&self, job: &mut Job) -> Result<(), StoreError> {
        let mut merged = job.clone();
        *job = self
            .exclusive(move |dir| {
                let path = job_path(dir, merged.id);
                if let Some(stored) = read_json_blocking::<Job>(&path)? {
                    merged.absorb(&stored);
                }
                write_json_blocking(&path, &merged)?;
                Ok(merged)
            })
            .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Job, StoreError> {
        match tokio::fs::read(self.job_path(id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("job {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut entries = tokio::fs::read_dir(self.data_dir.join(JOBS_DIR)).await?;
        let mut listed = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            let job = self.load(id).await?;
            listed.push((job.created_at, id));
        }
        listed.sort();
        Ok(listed.into_iter().map(|(_, id)| id).collect())
    }
}
