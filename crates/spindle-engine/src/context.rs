//! Task-side scheduler handle
//!
//! A `TaskContext` is handed to every task entry. It is the only way task
//! code interacts with the scheduler: cooperative yielding, spawning child
//! tasks, and waiting for them.

use crate::fiber::FiberContext;
use crate::group::TaskGroup;
use crate::task::TaskDesc;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

/// Handle to the scheduler, valid for the duration of one task execution.
///
/// All three methods are the task's only suspension points; between them the
/// task runs without preemption from other tasks on the same worker.
pub struct TaskContext {
    fiber: NonNull<FiberContext>,
}

impl TaskContext {
    pub(crate) fn new(fiber: &FiberContext) -> Self {
        Self {
            fiber: NonNull::from(fiber),
        }
    }

    fn fiber(&self) -> &FiberContext {
        // The fiber arena outlives every task execution.
        unsafe { self.fiber.as_ref() }
    }

    /// Yield the worker to other ready tasks.
    ///
    /// The task goes to the tail of the current worker's queue and resumes,
    /// on the same fiber, after at least one other ready task (if any) on
    /// that worker has run.
    pub fn yield_now(&mut self) {
        let fiber = self.fiber();
        fiber.request_reschedule();
        fiber.switch_to_scheduler();
    }

    /// Spawn child tasks without suspending.
    ///
    /// Children spawned with [`TaskGroup::Undefined`] inherit this task's
    /// group. Each child records this task as its parent; pair with
    /// [`wait_subtasks`](Self::wait_subtasks) before returning — a task must
    /// not finish while children it spawned are still outstanding.
    pub fn run_subtasks(&mut self, group: TaskGroup, tasks: Vec<TaskDesc>) {
        let fiber = self.fiber();
        fiber.scheduler().submit_children(fiber.index, group, tasks);
    }

    /// Suspend until every child spawned so far has finished.
    ///
    /// The fiber stays bound but is not re-enqueued; the last finishing
    /// child puts this task back on a worker queue. Returns immediately when
    /// no children are outstanding.
    pub fn wait_subtasks(&mut self) {
        let fiber = self.fiber();
        fiber.awaiting.store(true, Ordering::Release);
        if fiber.child_count.load(Ordering::Acquire) == 0 {
            if fiber.awaiting.swap(false, Ordering::AcqRel) {
                // children already finished; the wait is withdrawn
                return;
            }
            // a finishing child claimed the flag between the two loads and
            // already enqueued a resume — suspend to consume it
        }
        fiber.switch_to_scheduler();
    }
}
