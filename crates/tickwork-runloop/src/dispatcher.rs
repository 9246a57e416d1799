//! Dispatcher: turns due jobs into leased work for the worker pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tickwork_store::{
    JobRun, JobStore, Lease, LeaseManager, RunOutcome, RunState, StoreError, StoredJob,
};
use tickwork_workqueue::{RunReport, WorkItem, WorkerPool};

use crate::config::DispatcherConfig;
use crate::reschedule::advance_schedule;

/// Polls the store for due jobs and submits them under a lease.
pub struct Dispatcher {
    config: DispatcherConfig,
    store: Arc<dyn JobStore>,
    leases: LeaseManager,
    pool: Arc<WorkerPool>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, store: Arc<dyn JobStore>, pool: Arc<WorkerPool>) -> Self {
        Self {
            leases: LeaseManager::new(store.clone()),
            config,
            store,
            pool,
        }
    }

    /// Identity used for leases.
    pub fn holder(&self) -> &str {
        &self.config.holder
    }

    /// Claim every due job and submit it. Returns the number submitted.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let claimed = self.claim_due(now).await?;
        let mut submitted = 0;

        for work in claimed {
            let job_name = work.job_name.clone();
            let scheduled_for = work.scheduled_for;
            let token = work.lease.token;
            match self.pool.submit(work) {
                Ok(()) => submitted += 1,
                Err(e) => {
                    warn!("Could not submit job {}: {}", job_name, e);
                    self.unclaim(&job_name, scheduled_for, token, now).await?;
                }
            }
        }

        if submitted > 0 {
            debug!("Dispatcher submitted {} jobs", submitted);
        }
        Ok(submitted)
    }

    /// Lease every due job and write its run as `Leased`, without submitting.
    ///
    /// Jobs leased by another dispatcher are skipped. Runs that already have
    /// an outcome only advance the schedule; runs that were abandoned or
    /// timed out count an attempt, and fail once attempts run out.
    pub async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkItem>, StoreError> {
        let due = self.store.list_due(now).await?;
        let mut claimed = Vec::with_capacity(due.len());

        for job in due {
            let lease = match self
                .leases
                .acquire(job.name(), &self.config.holder, self.config.lease_duration, now)
                .await
            {
                Ok(lease) => lease,
                Err(StoreError::AlreadyLeased(_)) => {
                    debug!("Job {} is leased elsewhere, skipping", job.name());
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(work) = self.prepare(&job, lease, now).await? {
                claimed.push(work);
            }
        }

        Ok(claimed)
    }

    async fn prepare(
        &self,
        job: &StoredJob,
        lease: Lease,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkItem>, StoreError> {
        let Some(scheduled_for) = job.next_due else {
            self.release(lease.token, now).await?;
            return Ok(None);
        };

        let (mut run, expected) = match self.store.get_run(job.name(), scheduled_for).await? {
            None => (JobRun::new(job.name(), scheduled_for), None),
            Some(run) if matches!(run.state, RunState::Succeeded | RunState::Failed) => {
                debug!("Job {} already finished for {}, advancing", job.name(), scheduled_for);
                advance_schedule(self.store.as_ref(), job.name(), scheduled_for, now).await?;
                self.release(lease.token, now).await?;
                return Ok(None);
            }
            Some(mut run) if run.state == RunState::TimedOut || run.state.is_in_flight() => {
                let expected = run.lease_token;
                debug!(
                    "Job {} retrying {} run for {}",
                    job.name(),
                    run.state,
                    scheduled_for
                );
                run.requeue();
                (run, expected)
            }
            Some(run) => {
                let expected = run.lease_token;
                (run, expected)
            }
        };

        if run.attempts > self.config.max_attempts {
            warn!(
                "Job {} failed after {} attempts",
                job.name(),
                run.attempts
            );
            run.exhaust(now);
            if self.store.compare_and_record_run(&run, expected).await? {
                advance_schedule(self.store.as_ref(), job.name(), scheduled_for, now).await?;
            }
            self.release(lease.token, now).await?;
            return Ok(None);
        }

        run.lease(&lease);
        if !self.store.compare_and_record_run(&run, expected).await? {
            debug!("Run of job {} changed underneath, skipping", job.name());
            self.release(lease.token, now).await?;
            return Ok(None);
        }

        Ok(Some(WorkItem {
            job_name: job.definition.name.clone(),
            handler: job.definition.handler.clone(),
            payload: job.definition.payload.clone(),
            scheduled_for,
            attempt: run.attempts,
            lease,
        }))
    }

    /// Put a claimed run back to pending and drop its lease.
    async fn unclaim(
        &self,
        job_name: &str,
        scheduled_for: DateTime<Utc>,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut run) = self.store.get_run(job_name, scheduled_for).await? {
            run.state = RunState::Pending;
            run.lease_token = None;
            run.lease_expires_at = None;
            self.store.compare_and_record_run(&run, Some(token)).await?;
        }
        self.release(token, now).await
    }

    /// Apply a worker report: reschedule on an outcome, keep the due time
    /// on a timeout, then release the lease.
    pub async fn complete(&self, report: &RunReport, now: DateTime<Utc>) -> Result<(), StoreError> {
        if !report.recorded {
            debug!("Ignoring report for job {}, run was taken over", report.job_name);
            return Ok(());
        }

        match report.outcome {
            RunOutcome::Succeeded | RunOutcome::Failed { .. } => {
                advance_schedule(self.store.as_ref(), &report.job_name, report.scheduled_for, now)
                    .await?;
            }
            RunOutcome::TimedOut => {
                debug!("Job {} timed out, will retry on next tick", report.job_name);
            }
        }

        self.release(report.lease_token, now).await
    }

    async fn release(&self, token: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        match self.leases.release(token, now).await {
            Ok(_) => Ok(()),
            Err(StoreError::LeaseExpired(_)) => {
                warn!("Lease {} expired before release", token);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Poll and apply reports until `cancel` fires.
    pub async fn run(
        self: Arc<Self>,
        mut reports: mpsc::UnboundedReceiver<RunReport>,
        mut cancel: watch::Receiver<bool>,
    ) {
        info!(
            "Dispatcher {} started (poll interval: {:?})",
            self.config.holder, self.config.poll_interval
        );

        let next_poll = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(next_poll);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = &mut next_poll => {
                    let delay = match self.tick(Utc::now()).await {
                        Ok(_) => {
                            failures = 0;
                            self.config.poll_interval
                        }
                        Err(e) => {
                            failures = failures.saturating_add(1);
                            let delay = backoff_delay(
                                self.config.poll_interval,
                                failures,
                                self.config.max_backoff,
                            );
                            error!("Dispatcher tick failed, retrying in {:?}: {}", delay, e);
                            delay
                        }
                    };
                    next_poll.as_mut().reset(Instant::now() + delay);
                }
                Some(report) = reports.recv() => {
                    if let Err(e) = self.complete(&report, Utc::now()).await {
                        error!("Failed to complete job {}: {}", report.job_name, e);
                    }
                }
                _ = cancel.changed() => {
                    info!("Dispatcher shutting down");
                    break;
                }
            }
        }
    }
}

/// Poll delay after `failures` consecutive failed ticks.
pub(crate) fn backoff_delay(poll: Duration, failures: u32, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
    poll.checked_mul(factor).unwrap_or(cap).min(cap)
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
