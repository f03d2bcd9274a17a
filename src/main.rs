//! jobline - demo driver for the in-process job scheduler
//!
//! Walks the scheduler through small end-to-end scenarios so the lifecycle
//! (retries, timeouts, deferred starts, dependency rows, stop/resume) can
//! be observed in the log output.
//!
//! ## Commands
//!
//! - `jobline demo naked-jobs` - Drive jobs directly, without a scheduler
//! - `jobline demo scheduler` - Drive a dependency row through the pool
//!
//! ## Quick Start
//!
//! ```bash
//! jobline demo scheduler --log-level debug
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if std::env::var("JOBLINE_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
