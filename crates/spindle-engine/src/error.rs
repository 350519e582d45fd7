//! Scheduler error types

use std::io;

/// Errors surfaced while constructing a scheduler.
///
/// Runtime conditions (a starved dispatch, a stale pool handle, a wait
/// timeout) are not errors: they are reported through return values and
/// diagnostic counters instead.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A fiber stack could not be allocated.
    #[error("failed to allocate fiber stack")]
    StackAllocation(#[source] io::Error),

    /// A fiber context could not be created.
    #[error("failed to create fiber")]
    FiberCreation(#[source] io::Error),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread")]
    WorkerSpawn(#[source] io::Error),
}
