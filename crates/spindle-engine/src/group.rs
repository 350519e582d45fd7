//! Task groups and per-group completion tracking

use spindle_platform::Event;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Logical group a task is submitted into.
///
/// Clients wait on whole groups rather than individual tasks. `Undefined` is
/// a construction-time placeholder: the scheduler assigns the real group at
/// submission, and a child spawned with `Undefined` inherits its parent's
/// group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskGroup {
    /// First group.
    Group0,
    /// Second group.
    Group1,
    /// Third group.
    Group2,
    /// Not yet assigned.
    Undefined,
}

impl TaskGroup {
    /// Number of real groups.
    pub const COUNT: usize = 3;

    pub(crate) fn index(self) -> Option<usize> {
        match self {
            TaskGroup::Group0 => Some(0),
            TaskGroup::Group1 => Some(1),
            TaskGroup::Group2 => Some(2),
            TaskGroup::Undefined => None,
        }
    }
}

/// Outstanding-task counter plus completion event for one group.
///
/// The event is signalled exactly when the counter is zero. It starts
/// signalled: a group nothing was ever submitted to is complete.
pub(crate) struct GroupState {
    outstanding: AtomicUsize,
    done: Event,
}

impl GroupState {
    pub(crate) fn new() -> Self {
        Self {
            outstanding: AtomicUsize::new(0),
            done: Event::new(true),
        }
    }

    /// Account for one submitted task.
    ///
    /// The increment happens before the reset: a task cannot finish before
    /// it is enqueued, so the counter is never observed negative and the
    /// event is never left signalled with work outstanding.
    pub(crate) fn on_submit(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.done.reset();
    }

    /// Account for one finished task; signals the event at zero.
    pub(crate) fn on_finish(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.signal();
        }
    }

    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        self.done.wait(timeout)
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}
