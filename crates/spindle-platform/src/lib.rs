//! Platform primitives for the spindle task scheduler
//!
//! This crate wraps the small set of OS facilities the scheduler engine is
//! built on:
//! - **Fiber**: a stackful coroutine backed by POSIX `ucontext`
//!   (`fiber` module)
//! - **FiberStack**: an `mmap`-backed execution stack with a guard page at
//!   the low address (`stack` module)
//! - **Event**: a manual-reset event with timed waits (`event` module)
//!
//! Everything here is policy-free; scheduling decisions live in
//! `spindle-engine`.

#![warn(rust_2018_idioms)]

mod event;
mod fiber;
mod stack;

pub use event::Event;
pub use fiber::{Fiber, FiberEntry};
pub use stack::FiberStack;
