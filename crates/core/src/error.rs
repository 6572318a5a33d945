use thiserror::Error;

use crate::task::TaskStatus;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{0}")]
    Other(String),
}

/// Rejected task state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("task for {to} is already {status}")]
    AlreadySettled { to: String, status: TaskStatus },

    #[error("no task at index {0}")]
    NoSuchTask(usize),
}
