use async_trait::async_trait;
use uuid::Uuid;

use mailcast_core::Job;

use crate::error::StoreError;

/// Persisted jobs, so a later dispatch or the poller can find them.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Save after folding in every task the stored copy has already settled,
    /// so a writer holding an older snapshot cannot undo another's outcome.
    /// `job` is left equal to what was written.
    async fn save_merged(&self, job: &mut Job) -> Result<(), StoreError>;

    /// `StoreError::NotFound` for an unknown id.
    async fn load(&self, id: Uuid) -> Result<Job, StoreError>;

    /// All stored job ids, oldest first.
    async fn list(&self) -> Result<Vec<Uuid>, StoreError>;
}
