//! Prelude module for common imports

// Re-export job types with full paths
pub use crate::job::{
    HandlerId, INTERNAL_JOB_ERROR, Job, JobOptions, JobOutcome, JobState, MANUALLY_FAILED_ERROR,
    NO_TRIES_LEFT_ERROR, TIMEOUT_ERROR, Value, Work,
};

// Re-export scheduler and supporting types
pub use crate::cancellation::CancellationToken;
pub use crate::error::{JobError, SchedulerError};
pub use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerStats};
