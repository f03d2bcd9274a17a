//! Logging configuration
//!
//! Initializes tracing for the demo binary and for embedding applications
//! that do not bring their own subscriber.

/// Initializes logging with the specified level.
///
/// `RUST_LOG` takes precedence over `level` when set. Thread ids are
/// included because job completions fire on worker threads.
pub fn init(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
