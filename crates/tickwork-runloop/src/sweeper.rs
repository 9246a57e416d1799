//! Recovery sweeper.
//!
//! Finds runs still marked leased or running after their lease ran out, which
//! means the dispatcher or worker holding them died or stalled. Each one is
//! put back to pending with one more attempt, or failed when attempts are
//! exhausted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use tickwork_store::{JobRun, JobStore, LeaseManager, StoreError};

use crate::config::SweeperConfig;
use crate::reschedule::advance_schedule;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub requeued: usize,
    pub failed: usize,
}

/// Reclaims expired leases of in-flight runs.
pub struct Sweeper {
    config: SweeperConfig,
    store: Arc<dyn JobStore>,
    leases: LeaseManager,
}

impl Sweeper {
    pub fn new(config: SweeperConfig, store: Arc<dyn JobStore>) -> Self {
        Self {
            leases: LeaseManager::new(store.clone()),
            config,
            store,
        }
    }

    /// Reclaim every stale run at `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary, StoreError> {
        let mut summary = SweepSummary::default();

        for stale in self.store.stale_runs(now).await? {
            let Some(token) = stale.lease_token else {
                continue;
            };
            if self.leases.reclaim(token, now).await?.is_some() {
                debug!("Reclaimed lease {} on job {}", token, stale.job_name);
            }

            let mut run: JobRun = stale.clone();
            let exhausted = run.attempts + 1 > self.config.max_attempts;
            if exhausted {
                run.attempts += 1;
                run.exhaust(now);
            } else {
                run.requeue();
            }

            if !self.store.compare_and_record_run(&run, Some(token)).await? {
                debug!("Run of job {} moved on before the sweep, skipping", stale.job_name);
                continue;
            }

            if exhausted {
                warn!(
                    "Job {} run for {} failed permanently after {} attempts",
                    run.job_name, run.scheduled_for, run.attempts
                );
                advance_schedule(self.store.as_ref(), &run.job_name, run.scheduled_for, now).await?;
                summary.failed += 1;
            } else {
                info!(
                    "Requeued job {} run for {} (attempt {})",
                    run.job_name, run.scheduled_for, run.attempts
                );
                summary.requeued += 1;
            }
        }

        Ok(summary)
    }

    /// Sweep every interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        info!("Recovery sweeper started (interval: {:?})", self.config.interval);
        let mut interval = time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        error!("Recovery sweep failed: {}", e);
                    }
                }
                _ = cancel.changed() => {
                    info!("Recovery sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tickwork_store::{
        JobDefinition, Lease, MemoryJobStore, RunOutcome, RunState, ScheduleDescriptor,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    async fn leased_run(store: &dyn JobStore, name: &str, attempts: u32) -> JobRun {
        store
            .upsert(
                &JobDefinition::new(name, "ProcessJob", ScheduleDescriptor::recurring("* * * * *")),
                t0(),
            )
            .await
            .unwrap();
        let lease = Lease::new(name, "crashed", t0() + secs(360));
        assert!(store.try_lease(&lease, t0() + secs(60)).await.unwrap());
        let mut run = JobRun::new(name, t0() + secs(60));
        run.attempts = attempts;
        run.lease(&lease);
        store.record_run(&run).await.unwrap();
        run
    }

    fn sweeper(store: Arc<dyn JobStore>, max_attempts: u32) -> Sweeper {
        Sweeper::new(
            SweeperConfig {
                max_attempts,
                ..Default::default()
            },
            store,
        )
    }

    #[tokio::test]
    async fn test_requeues_after_expiry() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let run = leased_run(store.as_ref(), "ProcessJob", 0).await;
        let sweeper = sweeper(store.clone(), 10);

        assert_eq!(sweeper.sweep(t0() + secs(359)).await.unwrap(), SweepSummary::default());

        let summary = sweeper.sweep(t0() + secs(360)).await.unwrap();
        assert_eq!(summary.requeued, 1);
        let stored = store.get_run("ProcessJob", run.scheduled_for).await.unwrap().unwrap();
        assert_eq!(stored.state, RunState::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.lease_token.is_none());
        assert!(store.get_lease("ProcessJob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fails_when_attempts_exhausted() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let run = leased_run(store.as_ref(), "ProcessJob", 2).await;
        let sweeper = sweeper(store.clone(), 2);

        let now = t0() + secs(360);
        let summary = sweeper.sweep(now).await.unwrap();
        assert_eq!(summary.failed, 1);

        let stored = store.get_run("ProcessJob", run.scheduled_for).await.unwrap().unwrap();
        assert_eq!(stored.state, RunState::Failed);
        assert_eq!(stored.outcome, Some(RunOutcome::failed("max attempts exceeded")));
        // Anchored on the run, past `now`, so coalesced onto the next minute.
        assert_eq!(
            store.get("ProcessJob").await.unwrap().next_due,
            Some(t0() + secs(420))
        );
    }

    #[tokio::test]
    async fn test_late_worker_and_sweeper_do_not_both_win() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let run = leased_run(store.as_ref(), "ProcessJob", 0).await;
        let token = run.lease_token.unwrap();

        let mut finished = run.clone();
        finished.finish(RunOutcome::Succeeded, t0() + secs(400));
        assert!(store.compare_and_record_run(&finished, Some(token)).await.unwrap());

        let summary = sweeper(store.clone(), 10).sweep(t0() + secs(400)).await.unwrap();
        assert_eq!(summary, SweepSummary::default());
        let stored = store.get_run("ProcessJob", run.scheduled_for).await.unwrap().unwrap();
        assert_eq!(stored.state, RunState::Succeeded);
    }

    #[tokio::test]
    async fn test_worker_loses_after_sweep() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let run = leased_run(store.as_ref(), "ProcessJob", 0).await;
        let token = run.lease_token.unwrap();

        sweeper(store.clone(), 10).sweep(t0() + secs(360)).await.unwrap();

        let mut finished = run.clone();
        finished.finish(RunOutcome::Succeeded, t0() + secs(361));
        assert!(!store.compare_and_record_run(&finished, Some(token)).await.unwrap());
        let stored = store.get_run("ProcessJob", run.scheduled_for).await.unwrap().unwrap();
        assert_eq!(stored.state, RunState::Pending);
    }

    #[tokio::test]
    async fn test_renewed_lease_is_not_swept() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let run = leased_run(store.as_ref(), "ProcessJob", 0).await;
        let leases = LeaseManager::new(store.clone());
        leases
            .renew(run.lease_token.unwrap(), std::time::Duration::from_secs(300), t0() + secs(300))
            .await
            .unwrap();

        let summary = sweeper(store.clone(), 10).sweep(t0() + secs(400)).await.unwrap();
        assert_eq!(summary, SweepSummary::default());
    }
}
