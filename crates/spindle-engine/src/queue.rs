//! Concurrent FIFO queue
//!
//! Multi-producer / multi-consumer queue carrying work items and free-fiber
//! tokens. Push and pop are both non-blocking.

use crossbeam_deque::{Injector, Steal};

/// Unbounded MPMC FIFO.
///
/// Pushes from a single producer are never reordered; pops observe some
/// linearization of all pushes.
pub struct ConcurrentQueue<T> {
    inner: Injector<T>,
}

impl<T> ConcurrentQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Injector::new(),
        }
    }

    /// Push a value onto the tail.
    pub fn push(&self, value: T) {
        self.inner.push(value);
    }

    /// Pop the head, or `None` when the queue is empty.
    pub fn pop(&self) -> Option<T> {
        loop {
            match self.inner.steal() {
                Steal::Success(value) => return Some(value),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Whether the queue is currently empty (approximate under concurrency).
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of queued items (approximate under concurrency).
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
