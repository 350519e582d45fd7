//! Spindle Task Scheduler Engine
//!
//! A user-space task scheduler built on cooperative fibers. Small units of
//! work ("tasks") are multiplexed onto a fixed pool of pre-allocated
//! execution stacks ("fibers") by a fixed pool of worker threads. A running
//! task can suspend voluntarily — yielding the worker or waiting for child
//! tasks it spawned — without blocking the underlying OS thread. Tasks are
//! submitted into logical groups, and clients wait for group completion.
//!
//! # Example
//!
//! ```rust,no_run
//! use spindle_engine::{TaskDesc, TaskGroup, TaskScheduler};
//! use std::time::Duration;
//!
//! let scheduler = TaskScheduler::new().unwrap();
//!
//! scheduler.submit(
//!     TaskGroup::Group0,
//!     vec![TaskDesc::new(|ctx| {
//!         // cooperative yield point
//!         ctx.yield_now();
//!     })],
//! );
//!
//! assert!(scheduler.wait_group(TaskGroup::Group0, Duration::from_secs(1)));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod config;
mod context;
mod error;
mod fiber;
mod group;
mod pool;
mod queue;
mod scheduler;
mod task;
mod worker;

pub use config::{
    SchedulerConfig, FIBER_COUNT, FIBER_STACK_SIZE, SCHEDULER_STACK_SIZE, WORKER_COUNT,
};
pub use context::TaskContext;
pub use error::SchedulerError;
pub use group::TaskGroup;
pub use pool::{GenerationPool, PoolHandle};
pub use queue::ConcurrentQueue;
pub use scheduler::{SchedulerStats, TaskScheduler};
pub use task::{TaskDesc, TaskStatus};
