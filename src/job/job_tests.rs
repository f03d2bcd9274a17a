//! Tests for the job state machine and the built-in kinds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use anyhow::anyhow;
use pretty_assertions::assert_eq;

use super::*;

fn ok_worker() -> anyhow::Result<Value> {
    Ok(Value::Bool(true))
}

fn bad_worker() -> anyhow::Result<Value> {
    Err(anyhow!("boom"))
}

fn simple_job() -> Arc<Job> {
    Job::sync(ok_worker, JobOptions::new())
}

fn failing_job() -> Arc<Job> {
    Job::sync(bad_worker, JobOptions::new())
}

fn delayed_job(delay_ms: u64) -> Arc<Job> {
    Job::delayed(ok_worker, Duration::from_millis(delay_ms), JobOptions::new())
}

fn counting_handler(job: &Arc<Job>) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let cloned = Arc::clone(&counter);
    job.add_complete_handler(move |_| {
        cloned.fetch_add(1, Ordering::SeqCst);
    });
    counter
}

/// Polls `condition` until it holds or `timeout` elapses.
fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_ids_are_unique() {
    let job_1 = simple_job();
    let job_2 = simple_job();
    let job_3 = simple_job();

    assert_ne!(job_1.id(), job_2.id());
    assert_ne!(job_1.id(), job_3.id());
    assert_ne!(job_2.id(), job_3.id());
}

#[test]
fn test_can_be_started_on_default_tries() {
    assert!(simple_job().can_be_started());
}

#[test]
fn test_can_be_started_when_enough_tries() {
    let job = Job::sync(ok_worker, JobOptions::new().with_tries(1));
    assert!(job.can_be_started());
}

#[test]
fn test_can_be_started_when_not_enough_tries() {
    let job = Job::sync(ok_worker, JobOptions::new().with_tries(0));
    assert!(!job.can_be_started());
}

#[test]
fn test_start_state_is_pending() {
    let job = simple_job();
    assert_eq!(job.state(), JobState::Pending);
    assert_eq!(job.outcome(), None);
}

#[test]
fn test_run_with_no_tries_fails_without_work() {
    let job = Job::sync(ok_worker, JobOptions::new().with_tries(0));
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.outcome(), Some(JobOutcome::Failed(NO_TRIES_LEFT_ERROR.to_owned())));
    // The budget saturates at zero on this path.
    assert_eq!(job.tries_left(), 0);
}

#[test]
fn test_complete_handler_is_called_after_success() {
    let job = simple_job();
    let calls = counting_handler(&job);
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(job.outcome(), Some(JobOutcome::Completed(Value::Bool(true))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_complete_handler_is_called_after_fail() {
    let job = failing_job();
    let calls = counting_handler(&job);
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.outcome(), Some(JobOutcome::Failed(INTERNAL_JOB_ERROR.to_owned())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_complete_handler_is_not_called_twice() {
    let job = simple_job();
    let calls = counting_handler(&job);
    job.run().unwrap();
    job.restart().unwrap();

    // The subscriber set drained on the first completion.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_all_registered_handlers_fire() {
    let job = simple_job();
    let first = counting_handler(&job);
    let second = counting_handler(&job);
    job.run().unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_complete_handler_is_not_called_after_remove() {
    let job = simple_job();
    let counter = Arc::new(AtomicUsize::new(0));
    let cloned = Arc::clone(&counter);
    let handle = job.add_complete_handler(move |_| {
        cloned.fetch_add(1, Ordering::SeqCst);
    });

    assert!(job.remove_complete_handler(handle));
    assert!(!job.remove_complete_handler(handle));
    job.run().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_remove_all_complete_handlers() {
    let job = simple_job();
    let calls = counting_handler(&job);
    job.remove_all_complete_handlers();
    job.run().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stop_in_pending_state_is_rejected() {
    let job = simple_job();
    assert_eq!(
        job.stop(),
        Err(JobError::IncorrectState {
            operation: "stop",
            state: JobState::Pending,
        })
    );
}

#[test]
fn test_stop_in_completed_state_is_rejected() {
    let job = simple_job();
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Completed);
    assert!(job.stop().is_err());
}

#[test]
fn test_stop_in_failed_state_is_rejected() {
    let job = failing_job();
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert!(job.stop().is_err());
}

#[test]
fn test_stop_in_running_state_re_pends_the_job() {
    let job = delayed_job(200);
    let calls = counting_handler(&job);
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Running);
    job.stop().unwrap();
    assert_eq!(job.state(), JobState::Pending);
    assert_eq!(job.outcome(), None);

    // The armed delay was invalidated: its eventual fire is a no-op.
    thread::sleep(Duration::from_millis(600));
    assert_eq!(job.state(), JobState::Pending);
    assert_eq!(job.outcome(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_restart_in_pending_state_is_rejected() {
    let job = simple_job();
    assert_eq!(
        job.restart(),
        Err(JobError::IncorrectState {
            operation: "restart",
            state: JobState::Pending,
        })
    );
}

#[test]
fn test_restart_after_stop_is_rejected() {
    let job = delayed_job(200);
    job.run().unwrap();
    job.stop().unwrap();

    assert!(job.restart().is_err());
}

#[test]
fn test_restart_in_completed_state_reruns_the_work() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&runs);
    let job = Job::sync(
        move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        },
        JobOptions::new(),
    );

    job.run().unwrap();
    assert_eq!(job.state(), JobState::Completed);

    job.restart().unwrap();
    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_restart_in_failed_state_reruns_the_work() {
    let job = Job::sync(bad_worker, JobOptions::new().with_tries(2));
    job.run().unwrap();
    assert_eq!(job.state(), JobState::Failed);

    job.restart().unwrap();
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.outcome(), Some(JobOutcome::Failed(INTERNAL_JOB_ERROR.to_owned())));
}

#[test]
fn test_tries_decrease_after_fail() {
    let job = Job::sync(bad_worker, JobOptions::new().with_tries(2));
    job.run().unwrap();

    assert_eq!(job.tries_left(), 1);
    assert!(job.can_be_started());
}

#[test]
fn test_tries_do_not_decrease_after_complete() {
    let job = Job::sync(ok_worker, JobOptions::new().with_tries(2));
    job.run().unwrap();

    assert_eq!(job.tries_left(), 2);
}

#[test]
fn test_make_failed_on_pending_job() {
    let job = simple_job();
    let calls = counting_handler(&job);
    job.make_failed().unwrap();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.outcome(), Some(JobOutcome::Failed(MANUALLY_FAILED_ERROR.to_owned())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // The budget is untouched: cascaded failure is not an attempt.
    assert_eq!(job.tries_left(), 1);
}

#[test]
fn test_make_failed_on_running_job_is_rejected() {
    let job = delayed_job(200);
    job.run().unwrap();

    assert!(job.make_failed().is_err());
    job.stop().unwrap();
}

#[test]
fn test_delayed_job_completes_after_delay() {
    let job = delayed_job(50);
    let calls = counting_handler(&job);
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Running);
    assert!(wait_until(Duration::from_secs(2), || job.state() == JobState::Completed));
    assert_eq!(job.outcome(), Some(JobOutcome::Completed(Value::Bool(true))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timeout_wins_the_race_against_a_slow_delay() {
    let job = Job::delayed(
        ok_worker,
        Duration::from_millis(500),
        JobOptions::new().with_max_working_time(Duration::from_millis(100)),
    );
    let calls = counting_handler(&job);
    job.run().unwrap();

    assert!(wait_until(Duration::from_secs(2), || job.state() == JobState::Failed));
    assert_eq!(job.outcome(), Some(JobOutcome::Failed(TIMEOUT_ERROR.to_owned())));
    assert_eq!(job.tries_left(), 0);

    // The late delay fire must not overwrite the timeout outcome.
    thread::sleep(Duration::from_millis(700));
    assert_eq!(job.outcome(), Some(JobOutcome::Failed(TIMEOUT_ERROR.to_owned())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_completion_beats_a_generous_timeout() {
    let job = Job::delayed(
        ok_worker,
        Duration::from_millis(50),
        JobOptions::new().with_max_working_time(Duration::from_secs(1)),
    );
    job.run().unwrap();

    assert!(wait_until(Duration::from_secs(2), || job.state() == JobState::Completed));

    // The disarmed guard never flips the job afterwards.
    thread::sleep(Duration::from_millis(1200));
    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(job.tries_left(), 1);
}

#[test]
fn test_custom_work_kind_completes_through_the_notifier() {
    struct Echo {
        payload: &'static str,
    }

    impl Work for Echo {
        fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
            job.notify_complete(Value::String(self.payload.to_owned()))?;
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "echo"
        }
    }

    let job = Job::with_work(Echo { payload: "hello" }, JobOptions::new());
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(job.outcome(), Some(JobOutcome::Completed(Value::String("hello".to_owned()))));
}

#[test]
fn test_second_completion_in_one_episode_is_rejected() {
    struct DoubleNotify;

    impl Work for DoubleNotify {
        fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
            job.notify_complete(Value::Bool(true))?;
            assert!(job.notify_complete(Value::Bool(false)).is_err());
            Ok(())
        }
    }

    let job = Job::with_work(DoubleNotify, JobOptions::new());
    job.run().unwrap();

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(job.outcome(), Some(JobOutcome::Completed(Value::Bool(true))));
}

mod fs_jobs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_and_remove_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("nested/dir");

        let create = Job::create_directory(&path, JobOptions::new());
        create.run().unwrap();
        assert_eq!(create.state(), JobState::Completed);
        assert!(path.is_dir());

        let remove = Job::remove_directory(root.path().join("nested"), true, JobOptions::new());
        remove.run().unwrap();
        assert_eq!(remove.state(), JobState::Completed);
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_non_empty_directory_without_recursive_fails() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("full")).unwrap();
        std::fs::write(root.path().join("full/keep.txt"), "x").unwrap();

        let remove = Job::remove_directory(root.path().join("full"), false, JobOptions::new());
        remove.run().unwrap();

        assert_eq!(remove.state(), JobState::Failed);
        assert_eq!(remove.outcome(), Some(JobOutcome::Failed(INTERNAL_JOB_ERROR.to_owned())));
    }

    #[test]
    fn test_write_read_append_round() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("notes.txt");

        Job::write_text_file(&path, "alpha", false, JobOptions::new()).run().unwrap();
        Job::write_text_file(&path, " beta", true, JobOptions::new()).run().unwrap();

        let read = Job::read_text_file(&path, JobOptions::new());
        read.run().unwrap();
        assert_eq!(read.outcome(), Some(JobOutcome::Completed(Value::String("alpha beta".to_owned()))));
    }

    #[test]
    fn test_remove_missing_file_still_completes() {
        let root = tempfile::tempdir().unwrap();

        let remove = Job::remove_file(root.path().join("ghost.txt"), JobOptions::new());
        remove.run().unwrap();

        assert_eq!(remove.state(), JobState::Completed);
    }

    #[test]
    fn test_read_missing_file_fails_internally() {
        let root = tempfile::tempdir().unwrap();

        let read = Job::read_text_file(root.path().join("ghost.txt"), JobOptions::new());
        read.run().unwrap();

        assert_eq!(read.state(), JobState::Failed);
        assert_eq!(read.outcome(), Some(JobOutcome::Failed(INTERNAL_JOB_ERROR.to_owned())));
    }
}
