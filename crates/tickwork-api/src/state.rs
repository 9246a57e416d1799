//! Shared handler state.

use std::sync::Arc;
use std::time::Instant;

use tickwork_runloop::Scheduler;

/// State shared by every route.
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    started_at: Instant,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
