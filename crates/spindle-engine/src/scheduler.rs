//! Scheduler facade
//!
//! `TaskScheduler` owns everything with a fixed footprint: the worker
//! contexts and their threads, the fiber arena and its stacks, the
//! free-fiber queue, and the per-group completion state. Submission is
//! round-robin across workers with a relaxed cursor; the races that allows
//! only affect distribution quality, never correctness.

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::fiber::FiberContext;
use crate::group::{GroupState, TaskGroup};
use crate::queue::ConcurrentQueue;
use crate::task::{PendingTask, TaskDesc, WorkItem};
use crate::worker::{worker_main, WorkerContext};
use std::array;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Scheduler state shared between the facade and the worker threads.
pub(crate) struct SchedulerInner {
    pub(crate) workers: Box<[WorkerContext]>,
    pub(crate) fibers: Box<[FiberContext]>,
    /// Indices of fibers not currently bound to a task; pre-populated with
    /// the whole arena at construction.
    pub(crate) free_fibers: ConcurrentQueue<usize>,
    pub(crate) groups: [GroupState; TaskGroup::COUNT],
    pub(crate) shutdown: AtomicBool,
    pub(crate) tasks_completed: AtomicU64,
    pub(crate) starved_dispatches: AtomicU64,
    round_robin: AtomicUsize,
}

impl SchedulerInner {
    fn next_worker(&self) -> &WorkerContext {
        let index = self.round_robin.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[index]
    }

    fn enqueue(&self, item: WorkItem) {
        let worker = self.next_worker();
        worker.queue.push(item);
        worker.wake.signal();
    }

    pub(crate) fn enqueue_resume(&self, fiber_index: usize) {
        self.enqueue(WorkItem::Resume(fiber_index));
    }

    pub(crate) fn submit(&self, group: TaskGroup, tasks: Vec<TaskDesc>) {
        let group_index = group
            .index()
            .expect("tasks cannot be submitted to the undefined group");
        for mut desc in tasks {
            desc.group = group;
            self.groups[group_index].on_submit();
            self.enqueue(WorkItem::Start(PendingTask { desc, parent: None }));
        }
    }

    /// Spawn children on behalf of the task bound to `parent_index`.
    pub(crate) fn submit_children(
        &self,
        parent_index: usize,
        group: TaskGroup,
        tasks: Vec<TaskDesc>,
    ) {
        let parent = &self.fibers[parent_index];
        let group = match group {
            TaskGroup::Undefined => parent.bound_group(),
            explicit => explicit,
        };
        let group_index = group
            .index()
            .expect("child tasks need a parent with an assigned group");

        // The parent's counter covers every child before any of them can
        // run; a fast child can therefore never see a zero count.
        parent.child_count.fetch_add(tasks.len(), Ordering::AcqRel);

        for mut desc in tasks {
            desc.group = group;
            self.groups[group_index].on_submit();
            self.enqueue(WorkItem::Start(PendingTask {
                desc,
                parent: Some(parent_index),
            }));
        }
    }
}

/// Diagnostic counters, all monotone over the scheduler's lifetime except
/// `free_fibers`, which is a point-in-time reading.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Tasks that ran to completion.
    pub tasks_completed: u64,
    /// Dispatch attempts refused because every fiber was occupied. A value
    /// that keeps growing while nothing completes means the fiber pool is
    /// oversubscribed by tasks waiting on children that cannot run.
    pub starved_dispatches: u64,
    /// Fibers currently available for binding.
    pub free_fibers: usize,
}

/// Cooperative fiber task scheduler.
///
/// Dropping the scheduler stops the workers and joins their threads. Tasks
/// still queued are dropped unexecuted; tasks suspended mid-execution leak
/// whatever state their fiber stacks hold, so wait for the relevant groups
/// before dropping.
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl TaskScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new() -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with an explicit configuration.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let worker_count = config.resolved_worker_count();

        let fibers = (0..config.fiber_count)
            .map(|index| FiberContext::new(index, config.fiber_stack_size))
            .collect::<Result<Vec<_>, _>>()?;
        let workers: Vec<_> = (0..worker_count).map(WorkerContext::new).collect();

        let inner = Arc::new(SchedulerInner {
            workers: workers.into_boxed_slice(),
            fibers: fibers.into_boxed_slice(),
            free_fibers: ConcurrentQueue::new(),
            groups: array::from_fn(|_| GroupState::new()),
            shutdown: AtomicBool::new(false),
            tasks_completed: AtomicU64::new(0),
            starved_dispatches: AtomicU64::new(0),
            round_robin: AtomicUsize::new(0),
        });

        // The arena is pinned behind the Arc now; fibers can point back at
        // it and at their own slots.
        let inner_ptr = Arc::as_ptr(&inner);
        for fiber in inner.fibers.iter() {
            fiber.init_fiber(inner_ptr)?;
            inner.free_fibers.push(fiber.index);
        }

        let mut threads = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let thread_inner = Arc::clone(&inner);
            let spawned = thread::Builder::new()
                .name(format!("spindle-worker-{index}"))
                .stack_size(config.scheduler_stack_size)
                .spawn(move || worker_main(thread_inner, index));
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(err) => {
                    // unwind the workers already running
                    inner.shutdown.store(true, Ordering::Release);
                    for worker in inner.workers.iter() {
                        worker.wake.signal();
                    }
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::WorkerSpawn(err));
                }
            }
        }

        Ok(Self { inner, threads })
    }

    /// Submit tasks into `group`, fire-and-forget.
    ///
    /// Each task is assigned to a worker round-robin; submission order is
    /// preserved per worker. `group` must not be [`TaskGroup::Undefined`].
    pub fn submit(&self, group: TaskGroup, tasks: Vec<TaskDesc>) {
        self.inner.submit(group, tasks);
    }

    /// Wait until every task in `group` has finished.
    ///
    /// Returns `false` on timeout; the tasks keep running either way.
    pub fn wait_group(&self, group: TaskGroup, timeout: Duration) -> bool {
        let group_index = group.index().expect("cannot wait on the undefined group");
        self.inner.groups[group_index].wait(timeout)
    }

    /// Wait until every group has finished, against a single deadline.
    pub fn wait_all(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.inner
            .groups
            .iter()
            .all(|group| group.wait(deadline.saturating_duration_since(Instant::now())))
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.inner.workers.len()
    }

    /// Number of fibers in the arena.
    pub fn fiber_count(&self) -> usize {
        self.inner.fibers.len()
    }

    /// Current diagnostic counters.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            starved_dispatches: self.inner.starved_dispatches.load(Ordering::Relaxed),
            free_fibers: self.inner.free_fibers.len(),
        }
    }

    fn shutdown_and_join(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.inner.shutdown.store(true, Ordering::Release);
        for worker in self.inner.workers.iter() {
            worker.wake.signal();
        }
        for handle in self.threads.drain(..) {
            handle.join().expect("worker thread panicked");
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
