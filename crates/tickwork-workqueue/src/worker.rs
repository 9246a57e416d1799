//! Worker pool for job execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tickwork_store::{JobRun, JobStore, Lease, LeaseManager, RunOutcome, StoreError};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handler::{HandlerRegistry, JobContext};

/// A leased run handed to the pool.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_name: String,
    pub handler: String,
    pub payload: Vec<u8>,
    pub scheduled_for: DateTime<Utc>,
    pub attempt: u32,
    pub lease: Lease,
}

/// Sent to the dispatcher once a run has an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub job_name: String,
    pub scheduled_for: DateTime<Utc>,
    pub lease_token: Uuid,
    pub outcome: RunOutcome,
    /// False when another writer (usually the sweeper) had already taken
    /// the run over, or the worker lost its lease mid-run, so the outcome
    /// was not stored.
    pub recorded: bool,
}

/// Outcome reported for a run whose lease could not be renewed.
pub const LEASE_LOST: &str = "lease lost";

enum Execution {
    Finished(RunOutcome),
    /// Renewal found the lease expired or replaced; the handler was aborted.
    LeaseLost,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &RunOutcome) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        let counter = match outcome {
            RunOutcome::Succeeded => &self.succeeded,
            RunOutcome::Failed { .. } => &self.failed,
            RunOutcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runs handlers with bounded concurrency.
pub struct WorkerPool {
    config: PoolConfig,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn JobStore>,
    leases: LeaseManager,
    reports: mpsc::UnboundedSender<RunReport>,
    semaphore: Arc<Semaphore>,
    running: AtomicBool,
    counters: Counters,
}

impl WorkerPool {
    /// Create a pool. Outcomes are reported on `reports`.
    pub fn new(
        config: PoolConfig,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn JobStore>,
        reports: mpsc::UnboundedSender<RunReport>,
    ) -> Self {
        let permits = config.max_workers.max(1) as usize;
        Self {
            config,
            registry,
            leases: LeaseManager::new(store.clone()),
            store,
            reports,
            semaphore: Arc::new(Semaphore::new(permits)),
            running: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Start accepting work.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Worker pool started with {} workers", self.config.max_workers);
    }

    /// Stop accepting work. Jobs already submitted run to completion.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of idle worker slots.
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            processed: self.counters.processed.load(Ordering::SeqCst),
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            timed_out: self.counters.timed_out.load(Ordering::SeqCst),
        }
    }

    /// Queue a leased run. Returns immediately; the run starts once a worker
    /// slot frees up.
    pub fn submit(self: &Arc<Self>, work: WorkItem) -> Result<(), PoolError> {
        if !self.is_running() {
            return Err(PoolError::NotRunning);
        }

        let pool = self.clone();
        tokio::spawn(async move {
            let Ok(_permit) = pool.semaphore.clone().acquire_owned().await else {
                return;
            };
            pool.process(work).await;
        });
        Ok(())
    }

    async fn process(&self, work: WorkItem) {
        let token = work.lease.token;

        let lease = match self
            .leases
            .renew(token, self.config.lease_duration, Utc::now())
            .await
        {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Dropping job {} before start: {}", work.job_name, e);
                return;
            }
        };

        let mut run = JobRun::new(&work.job_name, work.scheduled_for);
        run.attempts = work.attempt;
        run.lease(&lease);
        run.start(Utc::now());
        match self.store.compare_and_record_run(&run, Some(token)).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Job {} was taken over before start, dropping", work.job_name);
                return;
            }
            Err(e) => {
                error!("Failed to mark job {} running: {}", work.job_name, e);
                return;
            }
        }

        debug!("Worker running job {} (attempt {})", work.job_name, work.attempt);
        let outcome = match self.execute(&work).await {
            Execution::Finished(outcome) => outcome,
            Execution::LeaseLost => {
                // The run stays as written under the lost lease; recovery
                // requeues it once the lease is reclaimed.
                warn!("Lease for job {} lost mid-run, handler aborted", work.job_name);
                let outcome = RunOutcome::failed(LEASE_LOST);
                self.counters.record(&outcome);
                self.report(work, token, outcome, false);
                return;
            }
        };
        self.counters.record(&outcome);
        match &outcome {
            RunOutcome::Succeeded => debug!("Job {} succeeded", work.job_name),
            RunOutcome::Failed { error } => warn!("Job {} failed: {}", work.job_name, error),
            RunOutcome::TimedOut => warn!(
                "Job {} timed out after {:?}",
                work.job_name, self.config.job_timeout
            ),
        }

        run.finish(outcome.clone(), Utc::now());
        let recorded = match self.store.compare_and_record_run(&run, Some(token)).await {
            Ok(recorded) => recorded,
            Err(e) => {
                error!("Failed to record outcome of job {}: {}", work.job_name, e);
                false
            }
        };
        if !recorded {
            warn!("Outcome of job {} discarded, run was taken over", work.job_name);
        }

        self.report(work, token, outcome, recorded);
    }

    fn report(&self, work: WorkItem, token: Uuid, outcome: RunOutcome, recorded: bool) {
        let report = RunReport {
            job_name: work.job_name,
            scheduled_for: work.scheduled_for,
            lease_token: token,
            outcome,
            recorded,
        };
        if self.reports.send(report).is_err() {
            debug!("Report receiver closed");
        }
    }

    async fn execute(&self, work: &WorkItem) -> Execution {
        let Some(handler) = self.registry.get(&work.handler) else {
            return Execution::Finished(RunOutcome::failed(format!(
                "no handler registered for '{}'",
                work.handler
            )));
        };

        let ctx = JobContext {
            job_name: work.job_name.clone(),
            scheduled_for: work.scheduled_for,
            attempt: work.attempt,
            payload: work.payload.clone(),
        };
        let mut task = tokio::spawn(async move { handler.handle(ctx).await });

        let deadline = tokio::time::sleep(self.config.job_timeout);
        tokio::pin!(deadline);
        let renew_every = self.config.renew_interval();
        let mut renew = tokio::time::interval_at(tokio::time::Instant::now() + renew_every, renew_every);

        loop {
            tokio::select! {
                joined = &mut task => {
                    return Execution::Finished(match joined {
                        Ok(Ok(())) => RunOutcome::Succeeded,
                        Ok(Err(e)) => RunOutcome::failed(e.to_string()),
                        Err(e) => RunOutcome::failed(join_failure(e)),
                    });
                }
                _ = &mut deadline => {
                    task.abort();
                    return Execution::Finished(RunOutcome::TimedOut);
                }
                _ = renew.tick() => {
                    match self
                        .leases
                        .renew(work.lease.token, self.config.lease_duration, Utc::now())
                        .await
                    {
                        Ok(_) => {}
                        Err(StoreError::LeaseExpired(_)) => {
                            task.abort();
                            return Execution::LeaseLost;
                        }
                        Err(e) => warn!("Lease renewal for job {} failed: {}", work.job_name, e),
                    }
                }
            }
        }
    }
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("handler task cancelled: {}", err);
    }
    let panic = err.into_panic();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {}", message)
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
