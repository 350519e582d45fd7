//! Manual-reset event
//!
//! A thin wrapper over a mutex-guarded flag and a condvar. Once signalled,
//! the event stays signalled (releasing every waiter, present and future)
//! until someone calls `reset`.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Manual-reset event.
///
/// `wait` returns `true` only when the event is actually signalled; spurious
/// condvar wakeups are absorbed internally and never reported as success.
pub struct Event {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    /// Create an event with the given initial state.
    pub fn new(signalled: bool) -> Self {
        Self {
            state: Mutex::new(signalled),
            cond: Condvar::new(),
        }
    }

    /// Signal the event, releasing all current and future waiters.
    pub fn signal(&self) {
        let mut signalled = self.state.lock();
        *signalled = true;
        self.cond.notify_all();
    }

    /// Return the event to the non-signalled state.
    pub fn reset(&self) {
        *self.state.lock() = false;
    }

    /// Whether the event is currently signalled.
    pub fn is_signalled(&self) -> bool {
        *self.state.lock()
    }

    /// Block until the event is signalled or the timeout elapses.
    ///
    /// Returns `true` if the event was signalled, `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut signalled = self.state.lock();
        if *signalled {
            return true;
        }
        let deadline = Instant::now() + timeout;
        while !*signalled {
            if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                return *signalled;
            }
        }
        true
    }
}
