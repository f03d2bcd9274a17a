//! One-shot cancellation tokens.
//!
//! A [`CancellationToken`] represents a single binary cancellation event. It
//! is used to invalidate pending timers and in-flight timeout guards when a
//! job or the scheduler leaves the state those timers were armed for: the
//! timer thread captures the token when armed and checks [`is_active`]
//! before acting.
//!
//! [`is_active`]: CancellationToken::is_active

use std::fmt;

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

/// A one-shot shared cancellation flag with callback fan-out.
///
/// Cancelling is idempotent: the first [`cancel`][Self::cancel] wins, later
/// calls are no-ops. Callbacks registered with [`on_cancel`][Self::on_cancel]
/// run exactly once, in registration order, outside the internal lock.
#[derive(Default)]
pub struct CancellationToken {
    inner: Mutex<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: bool,
    completed: bool,
    callbacks: Vec<Callback>,
}

impl CancellationToken {
    /// Creates a fresh, active token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and invokes all registered callbacks.
    ///
    /// The first call sets both the cancelled and completed flags; any
    /// later call returns without doing anything.
    pub fn cancel(&self) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            inner.completed = true;
            std::mem::take(&mut inner.callbacks)
        };
        // Invoked outside the lock so a callback may touch the token again.
        for callback in callbacks {
            callback();
        }
    }

    /// Marks the token completed without cancelling it.
    ///
    /// Used to record that the protected operation finished on its own;
    /// registered callbacks are never invoked.
    pub fn complete(&self) {
        self.inner.lock().completed = true;
    }

    /// Registers a callback to run when the token is cancelled.
    ///
    /// If the token is already cancelled the callback runs immediately on
    /// the calling thread.
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut inner = self.inner.lock();
            if !inner.cancelled {
                inner.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Returns true if [`cancel`][Self::cancel] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Returns true if the token is completed (cancelled or finished).
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.lock().completed
    }

    /// Returns true if the token is neither cancelled nor completed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let inner = self.inner.lock();
        !inner.cancelled && !inner.completed
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CancellationToken")
            .field("cancelled", &inner.cancelled)
            .field("completed", &inner.completed)
            .field("callbacks", &inner.callbacks.len())
            .finish()
    }
}
