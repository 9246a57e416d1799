//! Worker pool configuration.

use std::time::Duration;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of handlers running at once.
    pub max_workers: u32,

    /// A handler still running after this long is aborted.
    pub job_timeout: Duration,

    /// Length of each lease renewal. Renewal happens every half of this.
    pub lease_duration: Duration,
}

impl PoolConfig {
    /// How often a running job's lease is renewed.
    pub fn renew_interval(&self) -> Duration {
        (self.lease_duration / 2).max(Duration::from_millis(1))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            job_timeout: Duration::from_secs(300),
            lease_duration: Duration::from_secs(300),
        }
    }
}
