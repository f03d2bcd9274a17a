//! Error types for the job and scheduler domain

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobState;

/// Errors raised by job operations invoked in a disallowed phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The operation is not legal in the job's current phase.
    #[error("`{operation}` is not allowed while the job is {state:?}")]
    IncorrectState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Phase the job was in when the operation was attempted.
        state: JobState,
    },
}

/// Errors raised by scheduler operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Admission would exceed the configured pool size.
    #[error("job pool is full: {capacity} jobs already admitted")]
    PoolSize {
        /// The configured pool size.
        capacity: usize,
    },

    /// The job is already known to the scheduler in some partition.
    #[error("job {id} is already scheduled")]
    JobTwiceScheduling {
        /// Identifier of the offending job.
        id: Uuid,
    },

    /// A job operation failed while the scheduler was driving it.
    #[error(transparent)]
    Job(#[from] JobError),
}
