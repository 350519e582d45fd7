//! Worker threads
//!
//! Each worker owns an OS thread, one scheduler fiber (the thread itself,
//! adopted), a private ready-queue and a wake event. The worker drains its
//! queue, couples tasks to fibers, and handles whatever the task fiber
//! reports back after each switch: finished, yielded, or waiting on
//! children.

use crate::fiber::BoundTask;
use crate::queue::ConcurrentQueue;
use crate::scheduler::SchedulerInner;
use crate::task::{TaskStatus, WorkItem};
use spindle_platform::{Event, Fiber};
use std::hint;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// How long an idle worker parks before re-checking its queue and the
/// shutdown flag.
const IDLE_PARK_TIMEOUT: Duration = Duration::from_millis(20);

/// Back-off when every free fiber is taken; completions on other workers
/// return fibers to the pool in the meantime.
const STARVED_PARK_TIMEOUT: Duration = Duration::from_millis(1);

/// Shared per-worker state, owned by the scheduler.
pub(crate) struct WorkerContext {
    pub(crate) index: usize,
    /// Ready-queue: anyone may push, only this worker pops.
    pub(crate) queue: ConcurrentQueue<WorkItem>,
    /// Signalled on every push to this worker's queue.
    pub(crate) wake: Event,
    /// Save slot for this worker thread's own context while a task fiber
    /// runs. Only ever switched from and to on the owning thread.
    pub(crate) sched_fiber: Fiber,
}

impl WorkerContext {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            queue: ConcurrentQueue::new(),
            wake: Event::new(false),
            sched_fiber: Fiber::adopt(),
        }
    }
}

/// Main loop of a worker thread.
pub(crate) fn worker_main(inner: Arc<SchedulerInner>, index: usize) {
    let me = &inner.workers[index];
    debug_assert_eq!(me.index, index);

    loop {
        let mut starved = false;
        while let Some(item) = me.queue.pop() {
            if !dispatch(&inner, me, item) {
                starved = true;
                break;
            }
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        me.wake.reset();
        if starved {
            me.wake.wait(STARVED_PARK_TIMEOUT);
            continue;
        }
        if !me.queue.is_empty() {
            // pushed between the drain and the reset
            continue;
        }
        me.wake.wait(IDLE_PARK_TIMEOUT);
    }

    #[cfg(debug_assertions)]
    eprintln!("spindle-worker-{} shutting down", me.index);
}

/// Couple one work item to a fiber and run it until it suspends or finishes.
///
/// Returns `false` when a `Start` item could not be dispatched because no
/// fiber was free; the item has been pushed back to the queue tail.
fn dispatch(inner: &SchedulerInner, me: &WorkerContext, item: WorkItem) -> bool {
    let index = match item {
        WorkItem::Start(pending) => {
            let Some(index) = inner.free_fibers.pop() else {
                inner.starved_dispatches.fetch_add(1, Ordering::Relaxed);
                me.queue.push(WorkItem::Start(pending));
                return false;
            };
            let fiber = &inner.fibers[index];
            fiber.bind(BoundTask {
                entry: Some(pending.desc.entry),
                group: pending.desc.group,
                parent: pending.parent,
            });
            index
        }
        WorkItem::Resume(index) => {
            let fiber = &inner.fibers[index];
            // The previous worker publishes `parked` once the fiber's
            // context is fully saved; claim it before switching in.
            while !fiber.parked.swap(false, Ordering::AcqRel) {
                hint::spin_loop();
            }
            index
        }
    };

    let fiber = &inner.fibers[index];
    fiber.set_worker(me);
    unsafe { me.sched_fiber.switch_to(fiber.raw()) };

    // Back on the scheduler fiber: the task either finished or suspended.
    match fiber.status() {
        TaskStatus::Finished => {
            let task = fiber.unbind();
            inner.free_fibers.push(index);
            inner.tasks_completed.fetch_add(1, Ordering::Relaxed);

            if let Some(group) = task.group.index() {
                inner.groups[group].on_finish();
            }

            if let Some(parent_index) = task.parent {
                let parent = &inner.fibers[parent_index];
                let remaining = parent.child_count.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(remaining > 0, "child counter underflow");
                if remaining == 1 && parent.awaiting.swap(false, Ordering::AcqRel) {
                    // last child of a waiting parent
                    inner.enqueue_resume(parent_index);
                }
            }
        }
        TaskStatus::Running => {
            let reschedule = fiber.take_reschedule();
            fiber.parked.store(true, Ordering::Release);
            if reschedule {
                // yielded: tail of this worker's queue
                me.queue.push(WorkItem::Resume(index));
            }
            // else: waiting on children; the last child re-enqueues it
        }
        TaskStatus::Unknown => {
            unreachable!("task fiber returned control without reporting a status")
        }
    }
    true
}
