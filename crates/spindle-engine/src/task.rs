//! Task descriptors and execution status

use crate::context::TaskContext;
use crate::group::TaskGroup;
use std::fmt;

/// Entry point of a task, invoked exactly once on a fiber.
pub(crate) type TaskEntry = Box<dyn FnOnce(&mut TaskContext) + Send + 'static>;

/// Description of one unit of work.
///
/// A descriptor is owned by exactly one place at a time: the client that
/// built it, the worker queue it was submitted to, or the fiber context it
/// is bound to while executing. It is dropped on completion.
pub struct TaskDesc {
    pub(crate) entry: TaskEntry,
    pub(crate) group: TaskGroup,
}

impl TaskDesc {
    /// Create a task from its entry closure.
    ///
    /// The group starts `Undefined`; the scheduler assigns the real group at
    /// submission time.
    pub fn new<F>(entry: F) -> Self
    where
        F: FnOnce(&mut TaskContext) + Send + 'static,
    {
        Self {
            entry: Box::new(entry),
            group: TaskGroup::Undefined,
        }
    }

    /// The group this task is currently tagged with.
    pub fn group(&self) -> TaskGroup {
        self.group
    }
}

impl fmt::Debug for TaskDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDesc")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Status a task fiber reports back to its worker after a switch-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    /// No task bound, or a binding that has not started running yet.
    Unknown = 0,
    /// The task is live: it either yielded or is waiting on children.
    Running = 1,
    /// The entry function returned.
    Finished = 2,
}

impl TaskStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskStatus::Running,
            2 => TaskStatus::Finished,
            _ => TaskStatus::Unknown,
        }
    }
}

/// A task submitted but not yet bound to a fiber.
pub(crate) struct PendingTask {
    pub(crate) desc: TaskDesc,
    /// Fiber index of the spawning task, when this is a child.
    pub(crate) parent: Option<usize>,
}

/// One entry in a worker's ready-queue.
pub(crate) enum WorkItem {
    /// A task that still needs a fiber.
    Start(PendingTask),
    /// A suspended task resuming on the fiber it is still bound to.
    Resume(usize),
}
