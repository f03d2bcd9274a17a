//! Demonstration scenarios for the scheduler and the job lifecycle.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::info;

use jobline::{Job, JobOptions, Scheduler, SchedulerConfig, Value};

fn empty_worker() -> Result<Value> {
    Ok(Value::Null)
}

fn bad_worker() -> Result<Value> {
    Err(anyhow!("worker blew up"))
}

/// Jobs driven directly, without a scheduler: a delayed job with a restart
/// handler racing its timeout, a one-shot sync job, and a job retried past
/// its try budget.
pub fn naked_jobs() -> Result<()> {
    info!("======> Naked jobs");

    let delayed = Job::delayed(
        || Ok(Value::from("delayed job result")),
        Duration::from_millis(200),
        JobOptions::new()
            .with_max_working_time(Duration::from_millis(300))
            .with_tries(2),
    );
    delayed.add_complete_handler(|job: &Arc<Job>| {
        info!(job = %job.id(), outcome = ?job.outcome(), "complete handler for delayed job");
        // No handler is re-registered, so the second episode ends quietly.
        let _ = job.restart();
    });
    delayed.run()?;

    let sync = Job::sync(|| Ok(Value::from("sync job result")), JobOptions::new().with_tries(1));
    sync.run()?;

    let failing = Job::sync(bad_worker, JobOptions::new().with_tries(2));
    failing.run()?;
    failing.restart()?;
    failing.restart()?;

    thread::sleep(Duration::from_millis(100));
    delayed.stop()?;
    delayed.run()?;

    thread::sleep(Duration::from_secs(1));
    Ok(())
}

/// A scheduler pool exercising dependencies, a failure cascade, a deferred
/// start and a stop/resume cycle.
pub fn scheduler(config: &SchedulerConfig) -> Result<()> {
    info!("======> Scheduler");

    let scheduler = Scheduler::from_config(config);

    let job_1 = Job::sync(empty_worker, JobOptions::new());
    let job_2 = Job::sync(bad_worker, JobOptions::new());
    let job_3 = Job::delayed(empty_worker, Duration::from_millis(200), JobOptions::new());
    let job_4 = Job::delayed(
        empty_worker,
        Duration::from_millis(200),
        JobOptions::new().with_dependency(job_2.id()),
    );
    let job_5 = Job::delayed(
        empty_worker,
        Duration::from_millis(200),
        JobOptions::new().with_dependency(job_4.id()),
    );
    let job_6 = Job::sync(
        empty_worker,
        JobOptions::new().with_dependencies(vec![job_1.id(), job_3.id()]),
    );
    let job_7 = Job::sync(bad_worker, JobOptions::new());
    let job_8 = Job::sync(
        empty_worker,
        JobOptions::new().with_start_at(Utc::now() + chrono::Duration::milliseconds(200)),
    );

    scheduler.schedule(job_1)?;
    scheduler.schedule(job_2)?;
    scheduler.schedule(job_3)?;
    scheduler.schedule(job_4)?;
    scheduler.schedule(job_5)?;
    scheduler.schedule(Arc::clone(&job_8))?;

    scheduler.run();

    scheduler.schedule(job_6)?;
    scheduler.schedule(job_7)?;

    thread::sleep(Duration::from_millis(100));

    scheduler.stop();
    scheduler.run();

    thread::sleep(Duration::from_secs(2));
    info!(stats = ?scheduler.stats(), final_state = ?job_8.state(), "scenario finished");
    Ok(())
}
