//! Fiber contexts: the coupling between tasks and execution stacks
//!
//! A `FiberContext` is one element of the scheduler's fixed fiber arena. It
//! owns a guard-paged stack and a raw fiber whose entry is an infinite
//! trampoline: run the bound task, report `Finished`, switch back to the
//! scheduler fiber, wait to be bound again. Fibers are leased to tasks and
//! returned; they are never destroyed individually.
//!
//! Access discipline: the task record, status and worker pointer are only
//! touched by the worker currently coupled to this fiber or by the task
//! running on it (same OS thread at that moment). Child counters and the
//! `awaiting`/`parked` flags are the cross-thread edges and are atomic.

use crate::context::TaskContext;
use crate::error::SchedulerError;
use crate::group::TaskGroup;
use crate::scheduler::SchedulerInner;
use crate::task::{TaskEntry, TaskStatus};
use crate::worker::WorkerContext;
use spindle_platform::{Fiber, FiberStack};
use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// The task record installed in a fiber context while bound.
pub(crate) struct BoundTask {
    /// Taken by the trampoline when execution starts.
    pub(crate) entry: Option<TaskEntry>,
    pub(crate) group: TaskGroup,
    /// Fiber index of the spawning task, when this task is a child.
    pub(crate) parent: Option<usize>,
}

/// Per-fiber state, alive for the scheduler's whole lifetime.
pub(crate) struct FiberContext {
    /// Stable index into the scheduler's fiber arena.
    pub(crate) index: usize,

    stack: FiberStack,
    raw: OnceLock<Fiber>,

    /// Owning scheduler; set once the arena is pinned behind its `Arc`.
    scheduler: AtomicPtr<SchedulerInner>,

    /// Worker currently coupled to this fiber; null while idle.
    worker: AtomicPtr<WorkerContext>,

    /// Task status as last reported by the fiber (`TaskStatus` as u8).
    status: AtomicU8,

    /// Set by `yield_now`: the worker should re-enqueue after switch-out.
    reschedule: AtomicBool,

    /// Outstanding children spawned by the bound task.
    pub(crate) child_count: AtomicUsize,

    /// The bound task is suspended in `wait_subtasks`. Claimed (swapped to
    /// false) by exactly one finishing child, which then re-enqueues the
    /// parent.
    pub(crate) awaiting: AtomicBool,

    /// The fiber's machine context is fully saved; a resumer must claim
    /// this flag before switching in.
    pub(crate) parked: AtomicBool,

    active: UnsafeCell<Option<BoundTask>>,
}

// See the module header for the single-owner access discipline on the
// non-atomic fields.
unsafe impl Send for FiberContext {}
unsafe impl Sync for FiberContext {}

impl FiberContext {
    pub(crate) fn new(index: usize, stack_size: usize) -> Result<Self, SchedulerError> {
        let stack = FiberStack::new(stack_size).map_err(SchedulerError::StackAllocation)?;
        Ok(Self {
            index,
            stack,
            raw: OnceLock::new(),
            scheduler: AtomicPtr::new(ptr::null_mut()),
            worker: AtomicPtr::new(ptr::null_mut()),
            status: AtomicU8::new(TaskStatus::Unknown as u8),
            reschedule: AtomicBool::new(false),
            child_count: AtomicUsize::new(0),
            awaiting: AtomicBool::new(false),
            parked: AtomicBool::new(false),
            active: UnsafeCell::new(None),
        })
    }

    /// Create the raw fiber on this context's own stack.
    ///
    /// Deferred past construction because the trampoline argument is the
    /// context's final address inside the pinned arena.
    pub(crate) fn init_fiber(&self, scheduler: *const SchedulerInner) -> Result<(), SchedulerError> {
        self.scheduler
            .store(scheduler as *mut SchedulerInner, Ordering::Release);
        let arg = self as *const FiberContext as *mut c_void;
        let fiber =
            Fiber::with_stack(&self.stack, fiber_main, arg).map_err(SchedulerError::FiberCreation)?;
        if self.raw.set(fiber).is_err() {
            unreachable!("fiber initialized twice");
        }
        Ok(())
    }

    pub(crate) fn raw(&self) -> &Fiber {
        self.raw.get().expect("fiber not initialized")
    }

    pub(crate) fn scheduler(&self) -> &SchedulerInner {
        let scheduler = self.scheduler.load(Ordering::Acquire);
        assert!(!scheduler.is_null(), "fiber context has no scheduler");
        unsafe { &*scheduler }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn set_worker(&self, worker: *const WorkerContext) {
        self.worker
            .store(worker as *mut WorkerContext, Ordering::Release);
    }

    /// Install a task on this fiber. The caller must hold the fiber's lease
    /// (it came off the free-fiber queue).
    pub(crate) fn bind(&self, task: BoundTask) {
        let active = unsafe { &mut *self.active.get() };
        debug_assert!(active.is_none(), "binding an occupied fiber");
        *active = Some(task);
        self.set_status(TaskStatus::Running);
    }

    /// Clear the binding after the task finished; returns the task record
    /// for group and parent accounting.
    pub(crate) fn unbind(&self) -> BoundTask {
        let task = unsafe { &mut *self.active.get() }
            .take()
            .expect("unbinding an idle fiber");
        debug_assert_eq!(
            self.child_count.load(Ordering::Relaxed),
            0,
            "task finished with outstanding children"
        );
        self.worker.store(ptr::null_mut(), Ordering::Release);
        self.set_status(TaskStatus::Unknown);
        task
    }

    /// Take the bound task's entry for execution.
    pub(crate) fn take_entry(&self) -> TaskEntry {
        unsafe { &mut *self.active.get() }
            .as_mut()
            .and_then(|task| task.entry.take())
            .expect("fiber dispatched without a runnable task")
    }

    /// Group of the bound task; `Undefined` while idle.
    pub(crate) fn bound_group(&self) -> TaskGroup {
        unsafe { &*self.active.get() }
            .as_ref()
            .map(|task| task.group)
            .unwrap_or(TaskGroup::Undefined)
    }

    pub(crate) fn request_reschedule(&self) {
        self.reschedule.store(true, Ordering::Release);
    }

    pub(crate) fn take_reschedule(&self) -> bool {
        self.reschedule.swap(false, Ordering::AcqRel)
    }

    /// Suspend: save this fiber's context and resume the current worker's
    /// scheduler fiber. Returns when a worker switches back in.
    pub(crate) fn switch_to_scheduler(&self) {
        let worker = self.worker.load(Ordering::Acquire);
        assert!(!worker.is_null(), "fiber is not coupled to a worker");
        unsafe { self.raw().switch_to(&(*worker).sched_fiber) };
    }
}

/// Trampoline every task fiber runs.
///
/// The loop lets a recycled fiber pick up its next binding without stack
/// teardown: after each task finishes, control returns to the scheduler
/// fiber, and the next switch-in lands back at the top of the loop.
pub(crate) extern "C" fn fiber_main(arg: *mut c_void) {
    let fiber = unsafe { &*(arg as *const FiberContext) };
    loop {
        let entry = fiber.take_entry();
        let mut ctx = TaskContext::new(fiber);
        entry(&mut ctx);
        fiber.set_status(TaskStatus::Finished);
        fiber.switch_to_scheduler();
    }
}
