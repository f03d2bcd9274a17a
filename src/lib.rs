//! # Jobline - an in-process job scheduler
//!
//! Jobline is a bounded worker pool that executes opaque units of work
//! (jobs) with per-job retry, timeout, deferred start and dependency
//! ordering. Jobs own their execution mechanics (synchronous, delayed,
//! filesystem and HTTP kinds are built in); the scheduler coordinates state
//! transitions, dependency resolution, cascading failure propagation and
//! deferred dispatch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use jobline::{Job, JobOptions, Scheduler, Value};
//!
//! let scheduler = Scheduler::new();
//! scheduler.run();
//!
//! let fetch = Job::sync(|| Ok(Value::from("payload")), JobOptions::new());
//! let store = Job::sync(
//!     || Ok(Value::Bool(true)),
//!     JobOptions::new().with_dependency(fetch.id()),
//! );
//!
//! scheduler.schedule(Arc::clone(&fetch)).unwrap();
//! scheduler.schedule(store).unwrap();
//! ```
//!
//! ## Features
//!
//! - **Four-phase job lifecycle**: pending, running, completed, failed,
//!   with strict transition rules
//! - **Dependency ordering**: a job starts only after its dependencies
//!   complete; a failed dependency cascades
//! - **Retry budget**: failed jobs are restarted until their tries run out
//! - **Timeout guard**: a running job is failed after its maximum working
//!   time, even if the work never reports back
//! - **Deferred start**: jobs may be scheduled for a future instant
//! - **Stop/resume**: stopping the scheduler re-queues running work safely
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 (<https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license (<https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cancellation;
pub mod error;
pub mod job;
pub mod logging;
pub mod scheduler;

mod timer;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use cancellation::CancellationToken;
pub use error::{JobError, SchedulerError};
pub use job::{
    HandlerId, INTERNAL_JOB_ERROR, Job, JobOptions, JobOutcome, JobState, MANUALLY_FAILED_ERROR,
    NO_TRIES_LEFT_ERROR, TIMEOUT_ERROR, Value, Work,
};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStats};

/// Version of the jobline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
