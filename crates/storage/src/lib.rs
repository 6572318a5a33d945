//! Persistence for mailcast: delivery history, deferred deliveries, jobs.

pub mod duplicates;
pub mod error;
pub mod file;
pub mod handle;
pub mod history;
pub mod jobs;
pub mod memory;
pub mod scheduled;

pub use duplicates::{find_batch_duplicates, BatchDuplicate};
pub use error::StoreError;
pub use file::FileStore;
pub use handle::StoreHandle;
pub use history::{HistoryRecord, HistoryStore, Ledger, OversendReport, SendEntry};
pub use jobs::JobStore;
pub use memory::MemoryStore;
pub use scheduled::{
    DeliveryStatus, RecordFilter, ScheduledDeliveryRecord, ScheduledStore, Settlement, CLAIM_LEASE_SECS,
};
