//! Synchronous and delayed-asynchronous job kinds.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::job::{INTERNAL_JOB_ERROR, Job, JobOptions, JobState, Value, Work};
use crate::timer;

type WorkerFn = dyn Fn() -> anyhow::Result<Value> + Send + Sync;

/// Runs the caller-provided worker and delivers its completion.
///
/// An `Err` from the worker is converted to a failure here when the episode
/// is still live; a completion rejected by the running-phase guard (the job
/// was stopped or timed out meanwhile) is dropped at debug level.
fn run_worker(worker: &WorkerFn, job: &Arc<Job>) {
    let delivery = match worker() {
        Ok(value) => job.notify_complete(value),
        Err(err) => {
            debug!(job = %job.id(), error = %err, "worker raised an error");
            job.notify_error(INTERNAL_JOB_ERROR)
        }
    };
    if let Err(err) = delivery {
        debug!(job = %job.id(), error = %err, "late completion discarded");
    }
}

struct SyncWork {
    worker: Arc<WorkerFn>,
}

impl Work for SyncWork {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        run_worker(&*self.worker, job);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sync"
    }
}

struct DelayedWork {
    worker: Arc<WorkerFn>,
    delay: Duration,
    wait_token: Mutex<Option<Arc<CancellationToken>>>,
}

impl Work for DelayedWork {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        let token = Arc::new(CancellationToken::new());
        *self.wait_token.lock() = Some(Arc::clone(&token));

        let worker = Arc::clone(&self.worker);
        let job = Arc::clone(job);
        timer::spawn_after("job-delay", self.delay, token, move || {
            run_worker(&*worker, &job);
        });
        Ok(())
    }

    fn on_state_change(&self, _state: JobState) {
        // Any transition invalidates the armed delay, so a not-yet-fired
        // sleeper never runs the work for a dead episode.
        if let Some(token) = self.wait_token.lock().take() {
            if token.is_active() {
                token.cancel();
            }
        }
    }

    fn kind(&self) -> &'static str {
        "delayed"
    }
}

impl Job {
    /// Creates a job that runs `worker` inline on the calling thread.
    pub fn sync<W>(worker: W, options: JobOptions) -> Arc<Self>
    where
        W: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::with_work(
            SyncWork {
                worker: Arc::new(worker),
            },
            options,
        )
    }

    /// Creates a job that sleeps `delay` on a worker thread, then runs
    /// `worker` there.
    ///
    /// The timeout window, when configured, starts at [`Job::run`] and
    /// therefore includes the delay.
    pub fn delayed<W>(worker: W, delay: Duration, options: JobOptions) -> Arc<Self>
    where
        W: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::with_work(
            DelayedWork {
                worker: Arc::new(worker),
                delay,
                wait_token: Mutex::new(None),
            },
            options,
        )
    }
}
