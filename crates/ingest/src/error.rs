use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Not a single row produced a task; carries the joined row messages.
    #[error("no valid rows: {0}")]
    NoValidRows(String),

    #[error("unreadable tabular input: {0}")]
    Format(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Format(e.to_string())
    }
}

/// A row excluded from the batch. `row` is the 1-based sheet row, counting
/// the header as row 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}
