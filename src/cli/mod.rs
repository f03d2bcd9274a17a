//! CLI for the jobline demo binary
//!
//! Provides the `demo` subcommand:
//! - `naked-jobs`: drive jobs directly, without a scheduler
//! - `scheduler`: drive a dependency row through the pool

pub mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use jobline::{SchedulerConfig, logging};

/// CLI arguments for jobline
#[derive(Parser, Debug)]
#[command(name = "jobline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Scheduler configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a demonstration scenario
    Demo {
        /// Scenario to run
        #[arg(value_enum)]
        scenario: Scenario,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Jobs driven directly: retries, stop, timeout racing a delay
    NakedJobs,
    /// A scheduler pool with dependencies, deferred starts and stop/resume
    Scheduler,
}

/// Parses arguments and dispatches to the selected scenario.
pub fn run() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Demo {
            scenario: Scenario::NakedJobs,
        } => demo::naked_jobs(),
        Command::Demo {
            scenario: Scenario::Scheduler,
        } => demo::scheduler(&config),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}
