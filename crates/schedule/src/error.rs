//! Schedule error types.

use thiserror::Error;

/// Raised only while reading configuration; cell parsing never fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("unknown timezone: {0}")]
    UnknownZone(String),

    #[error("utc offset out of range: {0}")]
    OffsetOutOfRange(String),
}
