//! The scheduler: an admission-controlled pool of jobs.
//!
//! The scheduler owns four disjoint partitions - pending and running jobs,
//! plus the id sets of completed and failed jobs - and the rules that move
//! jobs between them: dependency gating, deferred starts, retry on failure
//! and cascading failure across the dependency graph.
//!
//! Completion callbacks run on whichever thread finishes a job, so the
//! partitions live behind a single mutex and every internal routine is
//! structured as lock / mutate / unlock / act: the lock is never held
//! across a call into a job operation.


use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::error::SchedulerError;
use crate::job::{Job, JobState};
use crate::timer;

fn default_pool_size() -> usize {
    10
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum combined number of pending and running jobs.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
        }
    }
}

/// Partition sizes, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Jobs admitted but not running.
    pub pending: usize,
    /// Jobs currently executing.
    pub running: usize,
    /// Ids of jobs that completed.
    pub completed: usize,
    /// Ids of jobs that failed.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Pool {
    pending: Vec<Arc<Job>>,
    running: Vec<Arc<Job>>,
    completed: HashSet<Uuid>,
    failed: HashSet<Uuid>,
    /// Present while the scheduler is running; doubles as the guard for
    /// every deferred-start timer armed in this run.
    master: Option<Arc<CancellationToken>>,
}

impl Pool {
    fn is_pending(&self, id: Uuid) -> bool {
        self.pending.iter().any(|job| job.id() == id)
    }

    fn take_pending(&mut self, id: Uuid) -> Option<Arc<Job>> {
        let index = self.pending.iter().position(|job| job.id() == id)?;
        Some(self.pending.remove(index))
    }

    fn remove_running(&mut self, id: Uuid) -> bool {
        let before = self.running.len();
        self.running.retain(|job| job.id() != id);
        self.running.len() != before
    }

    fn knows(&self, job: &Job) -> bool {
        let id = job.id();
        self.is_pending(id)
            || self.running.iter().any(|running| running.id() == id)
            || self.completed.contains(&id)
            || self.failed.contains(&id)
    }

    /// Pending jobs whose dependency list contains `id`.
    fn dependents_of(&self, id: Uuid) -> Vec<Arc<Job>> {
        self.pending
            .iter()
            .filter(|job| job.dependencies().contains(&id))
            .cloned()
            .collect()
    }
}

enum Gate {
    Deferred(Arc<CancellationToken>, Duration),
    Start,
}

/// An admission-controlled pool that owns a set of jobs and the rules that
/// move them between the pending/running/completed/failed partitions.
///
/// Cloning is cheap and shares the same pool.
#[derive(Debug, Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

#[derive(Debug)]
struct SchedulerInner {
    pool_size: usize,
    pool: Mutex<Pool>,
}

impl Scheduler {
    /// Creates a scheduler with the default pool size of 10.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }

    /// Creates a scheduler admitting at most `pool_size` jobs.
    #[must_use]
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self::from_config(&SchedulerConfig { pool_size })
    }

    /// Creates a scheduler from a [`SchedulerConfig`].
    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                pool_size: config.pool_size,
                pool: Mutex::new(Pool::default()),
            }),
        }
    }

    /// The configured pool size.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Number of jobs admitted and not yet terminal: `|pending| + |running|`.
    #[must_use]
    pub fn total_jobs_amount(&self) -> usize {
        let pool = self.inner.pool.lock();
        pool.pending.len() + pool.running.len()
    }

    /// True between [`run`][Self::run] and [`stop`][Self::stop].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.pool.lock().master.is_some()
    }

    /// Current partition sizes.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let pool = self.inner.pool.lock();
        SchedulerStats {
            pending: pool.pending.len(),
            running: pool.running.len(),
            completed: pool.completed.len(),
            failed: pool.failed.len(),
        }
    }

    /// Admits a job into the pool.
    ///
    /// If a dependency already failed, the job is failed immediately with
    /// the cascade marker and never runs. Otherwise, when the scheduler is
    /// running and the job's gates are open, it starts right away.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PoolSize`] when the pool is full, and
    /// [`SchedulerError::JobTwiceScheduling`] when the job is already known
    /// to any partition.
    pub fn schedule(&self, job: Arc<Job>) -> Result<(), SchedulerError> {
        let has_failed_dependency = {
            let mut pool = self.inner.pool.lock();
            if pool.pending.len() + pool.running.len() >= self.inner.pool_size {
                return Err(SchedulerError::PoolSize {
                    capacity: self.inner.pool_size,
                });
            }
            if pool.knows(&job) {
                return Err(SchedulerError::JobTwiceScheduling { id: job.id() });
            }
            info!(job = %job.id(), "schedule job");
            pool.pending.push(Arc::clone(&job));
            job.dependencies().iter().any(|dep| pool.failed.contains(dep))
        };

        if has_failed_dependency {
            job.make_failed()?;
            self.on_job_failed(&job);
            return Ok(());
        }

        self.try_start(&job);
        Ok(())
    }

    /// Marks the scheduler running and attempts to start every pending job.
    ///
    /// Calling `run` on an already-running scheduler replaces the master
    /// token; deferred-start timers armed under the previous token are
    /// orphaned and never fire usefully.
    pub fn run(&self) {
        info!("run scheduler");
        let snapshot = {
            let mut pool = self.inner.pool.lock();
            pool.master = Some(Arc::new(CancellationToken::new()));
            pool.pending.clone()
        };
        // The set shrinks underneath us as dependency rows start and
        // complete; try_start re-checks membership under the lock.
        for job in snapshot {
            self.try_start(&job);
        }
    }

    /// Stops the scheduler: invalidates every outstanding deferred start
    /// and re-queues running jobs as pending.
    ///
    /// Running jobs are detached from the scheduler before being stopped,
    /// so a completion racing the stop is silently dropped. Stopping an
    /// idle scheduler is a no-op.
    pub fn stop(&self) {
        let stopped = {
            let mut pool = self.inner.pool.lock();
            pool.master
                .take()
                .map(|token| (token, std::mem::take(&mut pool.running)))
        };
        let Some((token, running)) = stopped else {
            return;
        };

        info!("stop scheduler");
        token.cancel();

        for job in running {
            job.remove_all_complete_handlers();
            match job.stop() {
                Ok(()) => self.inner.pool.lock().pending.push(job),
                Err(err) => {
                    // The job reached a terminal state while we were
                    // stopping; it no longer belongs in the pool.
                    warn!(job = %job.id(), error = %err, "job finished during stop");
                }
            }
        }
    }

    /// Starts `job` if every gate is open: the scheduler is running, the
    /// job is still pending, its dependencies completed and its start time
    /// has arrived. A future start time arms a deferred-start timer
    /// instead. Returns true when the job was started.
    fn try_start(&self, job: &Arc<Job>) -> bool {
        let gate = {
            let mut pool = self.inner.pool.lock();
            let Some(master) = pool.master.clone() else {
                return false;
            };
            if !pool.is_pending(job.id()) {
                return false;
            }
            debug!(job = %job.id(), "check job");
            if !job.dependencies().iter().all(|dep| pool.completed.contains(dep)) {
                // Re-evaluated when each missing dependency completes.
                return false;
            }
            let now = Utc::now();
            if job.start_at() > now {
                let delay = (job.start_at() - now).to_std().unwrap_or(Duration::ZERO);
                Gate::Deferred(master, delay)
            } else {
                // The move out of pending is atomic with the gate checks,
                // so each unblocking event starts a job at most once.
                let Some(admitted) = pool.take_pending(job.id()) else {
                    return false;
                };
                pool.running.push(admitted);
                Gate::Start
            }
        };

        match gate {
            Gate::Deferred(master, delay) => {
                self.defer_start(job, &master, delay);
                false
            }
            Gate::Start => {
                self.launch(job);
                true
            }
        }
    }

    /// Registers the completion callback and runs the job. The pool mutex
    /// must not be held: synchronous jobs complete inside `run` and re-enter
    /// the scheduler on this very thread.
    fn launch(&self, job: &Arc<Job>) {
        self.attach(job);
        if let Err(err) = job.run() {
            warn!(job = %job.id(), error = %err, "job refused to run");
        }
    }

    fn attach(&self, job: &Arc<Job>) {
        let scheduler = self.clone();
        job.add_complete_handler(move |job| scheduler.on_job_event(job));
    }

    fn defer_start(&self, job: &Arc<Job>, master: &Arc<CancellationToken>, delay: Duration) {
        debug!(job = %job.id(), ?delay, "defer start");
        let scheduler = self.clone();
        let job = Arc::clone(job);
        let captured = Arc::clone(master);
        timer::spawn_after("deferred-start", delay, Arc::clone(master), move || {
            scheduler.deferred_fire(&job, &captured);
        });
    }

    /// Deferred-start timer body: re-checks the preconditions under the
    /// pool lock before starting.
    fn deferred_fire(&self, job: &Arc<Job>, captured: &Arc<CancellationToken>) {
        {
            let mut pool = self.inner.pool.lock();
            // `stop` cancels the token this timer was armed under; a later
            // `run` issues a fresh one, so an orphaned timer stays a no-op.
            if !captured.is_active() || pool.master.is_none() {
                return;
            }
            let Some(admitted) = pool.take_pending(job.id()) else {
                return;
            };
            pool.running.push(admitted);
        }
        self.launch(job);
    }

    /// The scheduler's completion callback, invoked by a job on its single
    /// completion event.
    fn on_job_event(&self, job: &Arc<Job>) {
        match job.state() {
            JobState::Completed => self.on_job_completed(job),
            JobState::Failed => self.on_job_failed(job),
            state => error!(job = %job.id(), ?state, "completion event in a non-terminal state"),
        }
    }

    fn on_job_completed(&self, job: &Arc<Job>) {
        let unblocked = {
            let mut pool = self.inner.pool.lock();
            pool.remove_running(job.id());
            pool.completed.insert(job.id());
            pool.dependents_of(job.id())
        };
        for dependent in unblocked {
            self.try_start(&dependent);
        }
    }

    fn on_job_failed(&self, job: &Arc<Job>) {
        let is_auto_fail = self.inner.pool.lock().is_pending(job.id());

        if job.can_be_started() && !is_auto_fail {
            // The failure drained the subscriber set; re-attach before the
            // retry so the next completion reaches the scheduler too.
            self.attach(job);
            if let Err(err) = job.restart() {
                warn!(job = %job.id(), error = %err, "failed job refused to restart");
            }
            return;
        }

        // Work-list of jobs newly bound for the failed set; keeps cascade
        // depth independent of the dependency chain length.
        let mut queue = vec![Arc::clone(job)];
        while let Some(failed) = queue.pop() {
            let dependents = {
                let mut pool = self.inner.pool.lock();
                if pool.take_pending(failed.id()).is_none() {
                    pool.remove_running(failed.id());
                }
                pool.failed.insert(failed.id());
                info!(job = %failed.id(), "job added to failed");
                pool.dependents_of(failed.id())
            };
            for dependent in dependents {
                if dependent.state() == JobState::Failed {
                    // Already marked earlier in this cascade.
                    continue;
                }
                if let Err(err) = dependent.make_failed() {
                    debug!(job = %dependent.id(), error = %err, "cascade target changed state");
                    continue;
                }
                queue.push(dependent);
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
