//! Job domain: the per-job state machine and the built-in job kinds.
//!
//! A [`Job`] is a unit of work with identity, a four-phase lifecycle and a
//! single completion event per run episode. The kind-specific "do the work"
//! step sits behind the [`Work`] trait; everything else (phase transitions,
//! the timeout guard, retry accounting, subscriber notification) is shared.
//!
//! Jobs are handed around as `Arc<Job>`: the scheduler, completion handlers
//! and helper threads all hold clones of the same job.

pub mod fs;
pub mod http;
pub mod simple;

#[cfg(test)]
mod job_tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::error::JobError;
use crate::timer;

/// Result value carried by completed jobs.
pub use serde_json::Value;

/// Failure marker written when the timeout guard fires first.
pub const TIMEOUT_ERROR: &str = "Timeout";
/// Failure marker written when a job is run with an exhausted try budget.
pub const NO_TRIES_LEFT_ERROR: &str = "No tries left";
/// Failure marker written on jobs failed by dependency cascade.
pub const MANUALLY_FAILED_ERROR: &str = "Manually failed";
/// Failure marker written when the work itself raises an error.
pub const INTERNAL_JOB_ERROR: &str = "Internal job error";

/// The four mutually-exclusive phases of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Created or re-queued, not yet running.
    Pending,
    /// The work has been kicked off and no completion event has fired yet.
    Running,
    /// The work finished and published a result.
    Completed,
    /// The work failed, timed out, ran out of tries or was cascade-failed.
    Failed,
}

/// Terminal outcome of a run episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// The work succeeded with this value.
    Completed(Value),
    /// The work failed; the marker is one of the failure sentinels or a
    /// caller-visible error description.
    Failed(String),
}

impl JobOutcome {
    /// Returns the success value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    /// Returns the failure marker, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(marker) => Some(marker),
        }
    }

    /// Returns true for failed outcomes.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Handle identifying a registered completion subscriber.
///
/// Closures have no identity of their own, so [`Job::add_complete_handler`]
/// returns one of these; pass it back to [`Job::remove_complete_handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Immutable per-job configuration.
///
/// Built with `with_*` methods:
///
/// ```
/// use jobline::JobOptions;
///
/// let options = JobOptions::new().with_tries(3).with_max_working_time(std::time::Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct JobOptions {
    start_at: DateTime<Utc>,
    max_working_time: Duration,
    tries: u32,
    dependencies: Vec<Uuid>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            // Evaluated per construction, so every job defaults to "now".
            start_at: Utc::now(),
            max_working_time: Duration::ZERO,
            tries: 1,
            dependencies: Vec::new(),
        }
    }
}

impl JobOptions {
    /// Creates options with the defaults: start now, no timeout, one try,
    /// no dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the earliest instant the scheduler may start the job.
    #[must_use]
    pub fn with_start_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.start_at = start_at;
        self
    }

    /// Sets the maximum working time; zero disables the timeout guard.
    #[must_use]
    pub fn with_max_working_time(mut self, max_working_time: Duration) -> Self {
        self.max_working_time = max_working_time;
        self
    }

    /// Sets the try budget. The budget includes the first attempt: one try
    /// means one attempt total.
    #[must_use]
    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    /// Sets the ids of jobs that must complete before this one may start.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<Uuid>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Adds a single dependency id.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Uuid) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

/// The kind-specific work step of a job.
///
/// Implementations kick off the actual work from [`begin`][Self::begin] and
/// deliver exactly one completion per episode through
/// [`Job::notify_complete`] or [`Job::notify_error`] - either inline on the
/// calling thread or later from a worker thread. Returning `Err` from
/// `begin` means no completion was delivered; the job converts it into a
/// failure with [`INTERNAL_JOB_ERROR`].
pub trait Work: Send + Sync + 'static {
    /// Starts the work for a fresh run episode.
    ///
    /// # Errors
    ///
    /// Any error means the work could not run (or could not report its own
    /// completion); the job fails with [`INTERNAL_JOB_ERROR`].
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()>;

    /// Hook invoked on every phase transition, outside the job lock.
    ///
    /// Kinds that keep per-episode timers use this to invalidate them when
    /// the job leaves the phase the timer was armed for.
    fn on_state_change(&self, state: JobState) {
        let _ = state;
    }

    /// Short kind tag used in log lines.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

type CompleteHandler = Box<dyn Fn(&Arc<Job>) + Send + Sync>;

struct JobCore {
    state: JobState,
    outcome: Option<JobOutcome>,
    tries_left: u32,
    timeout_token: Option<Arc<CancellationToken>>,
    handlers: Vec<(HandlerId, CompleteHandler)>,
    next_handler_id: u64,
}

impl JobCore {
    fn expect(&self, expected: JobState, operation: &'static str) -> Result<(), JobError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(JobError::IncorrectState {
                operation,
                state: self.state,
            })
        }
    }

    /// Cancels and clears the armed timeout token, if any. Timeout tokens
    /// never carry callbacks, so cancelling under the job lock is safe.
    fn disarm_timeout(&mut self) {
        if let Some(token) = self.timeout_token.take() {
            if token.is_active() {
                token.cancel();
            }
        }
    }

    fn drain_handlers(&mut self) -> Vec<(HandlerId, CompleteHandler)> {
        std::mem::take(&mut self.handlers)
    }
}

/// A unit of work with identity, lifecycle and a single completion event
/// per run episode.
///
/// Construct one through the kind constructors ([`Job::sync`],
/// [`Job::delayed`], the filesystem kinds, [`Job::http_get`]) or
/// [`Job::with_work`] for custom kinds.
pub struct Job {
    id: Uuid,
    options: JobOptions,
    work: Box<dyn Work>,
    core: Mutex<JobCore>,
}

impl Job {
    /// Creates a job around a custom [`Work`] implementation.
    pub fn with_work(work: impl Work, options: JobOptions) -> Arc<Self> {
        let tries = options.tries;
        Arc::new(Self {
            id: Uuid::new_v4(),
            options,
            work: Box::new(work),
            core: Mutex::new(JobCore {
                state: JobState::Pending,
                outcome: None,
                tries_left: tries,
                timeout_token: None,
                handlers: Vec::new(),
                next_handler_id: 0,
            }),
        })
    }

    /// The job's unique identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The earliest instant the scheduler may start the job.
    #[must_use]
    pub fn start_at(&self) -> DateTime<Utc> {
        self.options.start_at
    }

    /// Ids of jobs that must complete before this one may start.
    #[must_use]
    pub fn dependencies(&self) -> &[Uuid] {
        &self.options.dependencies
    }

    /// The job's current phase.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.core.lock().state
    }

    /// The outcome of the last terminal transition, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.core.lock().outcome.clone()
    }

    /// Remaining try budget. Decrements only on failed outcomes.
    #[must_use]
    pub fn tries_left(&self) -> u32 {
        self.core.lock().tries_left
    }

    /// True while the try budget is not exhausted.
    #[must_use]
    pub fn can_be_started(&self) -> bool {
        self.tries_left() > 0
    }

    /// Registers a one-shot completion subscriber and returns its handle.
    ///
    /// The subscriber set is drained on notification: each registration
    /// fires at most once, and a handler added after the set has drained
    /// receives nothing for that episode.
    pub fn add_complete_handler(&self, handler: impl Fn(&Arc<Job>) + Send + Sync + 'static) -> HandlerId {
        let mut core = self.core.lock();
        let id = HandlerId(core.next_handler_id);
        core.next_handler_id += 1;
        core.handlers.push((id, Box::new(handler)));
        id
    }

    /// Removes a previously registered subscriber. Returns false when the
    /// handle is unknown (already fired, removed, or never registered).
    pub fn remove_complete_handler(&self, id: HandlerId) -> bool {
        let mut core = self.core.lock();
        let before = core.handlers.len();
        core.handlers.retain(|(handler_id, _)| *handler_id != id);
        core.handlers.len() != before
    }

    /// Removes every registered subscriber.
    pub fn remove_all_complete_handlers(&self) {
        self.core.lock().handlers.clear();
    }

    /// Transitions `Pending -> Running` and kicks off the work.
    ///
    /// With an exhausted try budget this is a legal no-work transition to
    /// `Failed` with [`NO_TRIES_LEFT_ERROR`]. Errors raised by the work are
    /// converted into a `Failed` outcome with [`INTERNAL_JOB_ERROR`]; they
    /// never surface to the caller.
    ///
    /// # Errors
    ///
    /// [`JobError::IncorrectState`] when the job is not `Pending`.
    pub fn run(self: &Arc<Self>) -> Result<(), JobError> {
        let episode = {
            let mut core = self.core.lock();
            core.expect(JobState::Pending, "run")?;
            let token = Arc::new(CancellationToken::new());
            core.timeout_token = Some(Arc::clone(&token));
            core.outcome = None;
            core.state = JobState::Running;
            token
        };
        self.work.on_state_change(JobState::Running);

        if !self.can_be_started() {
            // Legal transition: Pending -> Running -> Failed without work.
            if let Err(err) = self.notify_error(NO_TRIES_LEFT_ERROR) {
                debug!(job = %self.id, error = %err, "no-tries failure rejected");
            }
            return Ok(());
        }

        info!(job = %self.id, kind = self.work.kind(), "run job");
        if let Err(err) = self.work.begin(self) {
            warn!(job = %self.id, error = %err, "job work raised an error");
            if let Err(state_err) = self.notify_error(INTERNAL_JOB_ERROR) {
                // The job already left Running (e.g. the timeout guard won);
                // the late error is dropped.
                debug!(job = %self.id, error = %state_err, "late work error discarded");
            }
            return Ok(());
        }

        self.arm_timeout(&episode);
        Ok(())
    }

    /// Transitions `Running -> Pending`, disarming the timeout guard and
    /// clearing the outcome.
    ///
    /// The underlying work is not interrupted; a completion arriving after
    /// the stop is rejected by the running-phase guard.
    ///
    /// # Errors
    ///
    /// [`JobError::IncorrectState`] when the job is not `Running`.
    pub fn stop(&self) -> Result<(), JobError> {
        {
            let mut core = self.core.lock();
            core.expect(JobState::Running, "stop")?;
            core.disarm_timeout();
            core.outcome = None;
            core.state = JobState::Pending;
        }
        self.work.on_state_change(JobState::Pending);
        info!(job = %self.id, "stop job");
        Ok(())
    }

    /// Transitions a terminal job back to `Pending` and immediately runs it.
    ///
    /// # Errors
    ///
    /// [`JobError::IncorrectState`] when the job is not `Completed` or
    /// `Failed`.
    pub fn restart(self: &Arc<Self>) -> Result<(), JobError> {
        {
            let mut core = self.core.lock();
            if !matches!(core.state, JobState::Completed | JobState::Failed) {
                return Err(JobError::IncorrectState {
                    operation: "restart",
                    state: core.state,
                });
            }
            core.outcome = None;
            core.state = JobState::Pending;
        }
        self.work.on_state_change(JobState::Pending);
        info!(job = %self.id, "restart job");
        self.run()
    }

    /// Fails a pending job without running it, with
    /// [`MANUALLY_FAILED_ERROR`] as the outcome. Used by the scheduler to
    /// propagate cascaded dependency failure.
    ///
    /// # Errors
    ///
    /// [`JobError::IncorrectState`] when the job is not `Pending`.
    pub fn make_failed(self: &Arc<Self>) -> Result<(), JobError> {
        let handlers = {
            let mut core = self.core.lock();
            core.expect(JobState::Pending, "make_failed")?;
            core.outcome = Some(JobOutcome::Failed(MANUALLY_FAILED_ERROR.to_owned()));
            core.state = JobState::Failed;
            core.drain_handlers()
        };
        self.work.on_state_change(JobState::Failed);
        info!(job = %self.id, "manually failed job");
        for (_, handler) in handlers {
            handler(self);
        }
        Ok(())
    }

    /// Publishes a successful completion for the current run episode.
    ///
    /// Called by [`Work`] implementations, on whichever thread the work
    /// finished on.
    ///
    /// # Errors
    ///
    /// [`JobError::IncorrectState`] when the job is no longer `Running`,
    /// i.e. the completion is late (the job was stopped, or the timeout
    /// guard or a second notifier got there first).
    pub fn notify_complete(self: &Arc<Self>, value: Value) -> Result<(), JobError> {
        self.finish(Ok(value), None, "notify_complete")
    }

    /// Publishes a failure for the current run episode, decrementing the
    /// try budget.
    ///
    /// # Errors
    ///
    /// [`JobError::IncorrectState`] when the job is no longer `Running`.
    pub fn notify_error(self: &Arc<Self>, marker: &str) -> Result<(), JobError> {
        self.finish(Err(marker.to_owned()), None, "notify_error")
    }

    /// Arms the timeout guard for the episode guarded by `token`.
    fn arm_timeout(self: &Arc<Self>, token: &Arc<CancellationToken>) {
        let max_working_time = self.options.max_working_time;
        if max_working_time.is_zero() || !token.is_active() {
            return;
        }
        let job = Arc::clone(self);
        let episode = Arc::clone(token);
        timer::spawn_after("job-timeout", max_working_time, Arc::clone(token), move || {
            job.expire(&episode);
        });
    }

    /// Timeout-guard entry point: fails the episode guarded by `token`
    /// unless a legitimate completion already won the race.
    fn expire(self: &Arc<Self>, token: &Arc<CancellationToken>) {
        match self.finish(Err(TIMEOUT_ERROR.to_owned()), Some(token), "timeout") {
            Ok(()) => {}
            Err(err) => debug!(job = %self.id, error = %err, "stale timeout ignored"),
        }
    }

    /// The single terminal transition out of `Running`.
    ///
    /// `episode` carries the timeout guard's captured token; when it is no
    /// longer active the guard lost the race and the call is a silent no-op.
    /// The token check, the phase check and the disarm all happen under the
    /// job lock, which makes "first to act wins" atomic. Subscribers are
    /// drained under the lock and invoked after it is released, so a handler
    /// may re-enter the job (e.g. to restart it).
    fn finish(
        self: &Arc<Self>,
        result: Result<Value, String>,
        episode: Option<&Arc<CancellationToken>>,
        operation: &'static str,
    ) -> Result<(), JobError> {
        let (state, handlers) = {
            let mut core = self.core.lock();
            if let Some(token) = episode {
                if !token.is_active() {
                    return Ok(());
                }
            }
            if core.state != JobState::Running {
                return Err(JobError::IncorrectState {
                    operation,
                    state: core.state,
                });
            }
            core.disarm_timeout();
            let (state, outcome) = match result {
                Ok(value) => (JobState::Completed, JobOutcome::Completed(value)),
                Err(marker) => {
                    core.tries_left = core.tries_left.saturating_sub(1);
                    (JobState::Failed, JobOutcome::Failed(marker))
                }
            };
            core.outcome = Some(outcome);
            core.state = state;
            (state, core.drain_handlers())
        };

        self.work.on_state_change(state);
        match state {
            JobState::Completed => info!(job = %self.id, "complete job"),
            _ => info!(job = %self.id, "fail job"),
        }
        for (_, handler) in &handlers {
            handler(self);
        }
        Ok(())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Job");
        debug.field("id", &self.id).field("kind", &self.work.kind());
        if let Some(core) = self.core.try_lock() {
            debug.field("state", &core.state).field("outcome", &core.outcome);
        }
        debug.finish_non_exhaustive()
    }
}
