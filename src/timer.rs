//! Sleeper-thread timers guarded by cancellation tokens.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, trace};

use crate::cancellation::CancellationToken;

/// Spawns a named thread that sleeps for `delay` and then invokes `action`,
/// provided the captured token is still active.
///
/// A zero `delay` still goes through a thread so the action never runs on
/// the arming thread. The token check happens after the sleep; callers that
/// need the check to be atomic with their own state re-check the token under
/// their lock inside `action`.
pub(crate) fn spawn_after<F>(name: &'static str, delay: Duration, token: Arc<CancellationToken>, action: F)
where
    F: FnOnce() + Send + 'static,
{
    let spawned = thread::Builder::new().name(name.to_owned()).spawn(move || {
        thread::sleep(delay);
        if token.is_active() {
            action();
        } else {
            trace!(timer = name, "timer invalidated before firing");
        }
    });

    if let Err(err) = spawned {
        error!(timer = name, error = %err, "failed to spawn timer thread");
    }
}
