//! Top-level error type for the tracker crate.
//!
//! Mirrors the error-kind taxonomy from the tracker design: shutdown,
//! planner, task, node-loss, shuffle and store errors all surface through
//! this type at the public API boundary. Internal transform closures never
//! raise errors of their own (they are total functions); failures instead
//! travel as `FailCause` values carried inside `JobMetadata`.

use crate::tracker::types::JobId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("tracker is shutting down")]
    ShuttingDown,

    #[error("job {0} already submitted")]
    DuplicateJob(JobId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
