pub mod config;
pub mod error;
pub mod job;
pub mod task;

pub use config::{
    load_dotenv, Config, DeliverabilityConfig, DispatchConfig, ScheduleConfig, SenderConfig,
    StorageConfig, StoreBackend,
};
pub use error::*;
pub use job::{Job, JobResult, JobStatus, Selection};
pub use task::{is_plausible_address, normalize_address, RecipientTask, TaskStatus};
