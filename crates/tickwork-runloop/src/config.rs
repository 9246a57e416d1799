//! Run loop configuration.

use std::time::Duration;

use uuid::Uuid;

use tickwork_workqueue::PoolConfig;

/// Attempts allowed before a run is failed permanently.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Identity written into every lease this dispatcher takes.
    pub holder: String,

    /// Time between polls for due jobs.
    pub poll_interval: Duration,

    /// Length of a freshly acquired lease.
    pub lease_duration: Duration,

    /// A run whose attempt count exceeds this is failed.
    pub max_attempts: u32,

    /// Upper bound for the poll delay after store errors.
    pub max_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            holder: format!("tickwork-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(15),
            lease_duration: Duration::from_secs(300),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Recovery sweeper settings.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,

    /// A stale run whose next attempt would exceed this is failed.
    pub max_attempts: u32,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Everything the [`Scheduler`](crate::Scheduler) needs to run its loops.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub dispatcher: DispatcherConfig,
    pub sweeper: SweeperConfig,
    pub pool: PoolConfig,
    /// Runs returned by [`job_status`](crate::Scheduler::job_status).
    pub status_history: usize,
}

impl SchedulerConfig {
    /// Runs shown in job status when `status_history` is zero.
    pub const DEFAULT_STATUS_HISTORY: usize = 10;

    pub(crate) fn status_history(&self) -> usize {
        if self.status_history == 0 {
            Self::DEFAULT_STATUS_HISTORY
        } else {
            self.status_history
        }
    }
}
