//! Scheduler configuration

use crate::error::SchedulerError;

/// Default number of worker threads.
pub const WORKER_COUNT: usize = 4;

/// Default number of pre-allocated task fibers.
pub const FIBER_COUNT: usize = 128;

/// Default stack size for worker threads, in bytes.
pub const SCHEDULER_STACK_SIZE: usize = 1024 * 1024;

/// Default stack size for task fibers, in bytes.
pub const FIBER_STACK_SIZE: usize = 256 * 1024;

/// Configuration for a [`TaskScheduler`](crate::TaskScheduler).
///
/// All sizes are fixed for the lifetime of the scheduler; there is no
/// dynamic growth of the worker or fiber pools.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads. `0` means one per hardware thread.
    pub worker_count: usize,
    /// Number of pre-allocated task fibers. Must be a power of two and at
    /// least twice the worker count.
    pub fiber_count: usize,
    /// Usable stack size for each task fiber, in bytes.
    pub fiber_stack_size: usize,
    /// Stack size for each worker thread, in bytes.
    pub scheduler_stack_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: WORKER_COUNT,
            fiber_count: FIBER_COUNT,
            fiber_stack_size: FIBER_STACK_SIZE,
            scheduler_stack_size: SCHEDULER_STACK_SIZE,
        }
    }
}

impl SchedulerConfig {
    pub(crate) fn resolved_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_count
        }
    }

    pub(crate) fn validate(&self) -> Result<(), SchedulerError> {
        let workers = self.resolved_worker_count();
        if !self.fiber_count.is_power_of_two() {
            return Err(SchedulerError::InvalidConfig(format!(
                "fiber_count must be a power of two, got {}",
                self.fiber_count
            )));
        }
        if self.fiber_count < workers * 2 {
            return Err(SchedulerError::InvalidConfig(format!(
                "fiber_count ({}) must be at least twice the worker count ({})",
                self.fiber_count, workers
            )));
        }
        if self.fiber_stack_size < 16 * 1024 {
            return Err(SchedulerError::InvalidConfig(format!(
                "fiber_stack_size ({}) is below the 16 KiB minimum",
                self.fiber_stack_size
            )));
        }
        if self.scheduler_stack_size < 64 * 1024 {
            return Err(SchedulerError::InvalidConfig(format!(
                "scheduler_stack_size ({}) is below the 64 KiB minimum",
                self.scheduler_stack_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_resolves_to_hardware_threads() {
        let config = SchedulerConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(config.resolved_worker_count() >= 1);
    }

    #[test]
    fn test_non_power_of_two_fiber_count_rejected() {
        let config = SchedulerConfig {
            fiber_count: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_too_few_fibers_rejected() {
        let config = SchedulerConfig {
            worker_count: 4,
            fiber_count: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
