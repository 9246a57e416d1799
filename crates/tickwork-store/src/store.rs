//! Job store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tickwork_schedule::ScheduleError;

use crate::error::StoreError;
use crate::model::{JobDefinition, JobRun, Lease, StoredJob};

/// Runs kept per job when no limit is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Which leases [`JobStore::clear_lease`] may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseFilter {
    /// Only a lease that has not expired (release by its holder).
    Live,
    /// Only a lease that has expired (reclaim by the sweeper).
    Expired,
}

impl LeaseFilter {
    pub(crate) fn matches(&self, lease: &Lease, now: DateTime<Utc>) -> bool {
        match self {
            LeaseFilter::Live => !lease.is_expired(now),
            LeaseFilter::Expired => lease.is_expired(now),
        }
    }
}

/// Durable scheduler state.
///
/// Every write that other components race on is conditional: leases move
/// through [`try_lease`](JobStore::try_lease), and run outcomes through
/// [`compare_and_record_run`](JobStore::compare_and_record_run).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a definition by name.
    ///
    /// Re-upserting an identical definition changes nothing. A changed
    /// schedule, or a job without a next-due time, is rescheduled from `now`.
    async fn upsert(&self, definition: &JobDefinition, now: DateTime<Utc>)
        -> Result<StoredJob, StoreError>;

    /// Load a job by name.
    async fn get(&self, name: &str) -> Result<StoredJob, StoreError>;

    /// All jobs, by name.
    async fn list(&self) -> Result<Vec<StoredJob>, StoreError>;

    /// Enabled jobs due at `now`, earliest first, ties broken by name.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<StoredJob>, StoreError>;

    /// Delete a job together with its lease and run history.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Overwrite the next-due time and enabled flag.
    async fn set_schedule_state(
        &self,
        name: &str,
        next_due: Option<DateTime<Utc>>,
        enabled: bool,
    ) -> Result<(), StoreError>;

    /// Insert or replace a run, then prune history beyond the limit.
    async fn record_run(&self, run: &JobRun) -> Result<(), StoreError>;

    /// Write `run` only if the stored run carries `expected_token`, or if no
    /// run exists and `expected_token` is `None`. Returns whether it wrote.
    async fn compare_and_record_run(
        &self,
        run: &JobRun,
        expected_token: Option<Uuid>,
    ) -> Result<bool, StoreError>;

    /// Load the run for a due time.
    async fn get_run(
        &self,
        job_name: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<JobRun>, StoreError>;

    /// Most recent runs of a job, newest first.
    async fn recent_runs(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, StoreError>;

    /// Leased or running runs whose lease expired at or before `now`.
    async fn stale_runs(&self, now: DateTime<Utc>) -> Result<Vec<JobRun>, StoreError>;

    /// Store `lease` unless another unexpired lease exists for the job.
    async fn try_lease(&self, lease: &Lease, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Move the expiry of a live lease, mirrored onto the run it covers.
    async fn extend_lease(
        &self,
        token: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, StoreError>;

    /// Remove the lease with `token` if it passes `filter`.
    async fn clear_lease(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
        filter: LeaseFilter,
    ) -> Result<Option<Lease>, StoreError>;

    /// Current lease row for a job, expired or not.
    async fn get_lease(&self, job_name: &str) -> Result<Option<Lease>, StoreError>;
}

/// Compute the stored form of an upserted definition.
pub(crate) fn merge_definition(
    existing: Option<&StoredJob>,
    definition: &JobDefinition,
    now: DateTime<Utc>,
) -> Result<StoredJob, ScheduleError> {
    definition.schedule.validate()?;

    match existing {
        Some(job) if job.definition == *definition => Ok(job.clone()),
        Some(job) => {
            let next_due = if job.definition.schedule == definition.schedule && job.next_due.is_some() {
                job.next_due
            } else {
                definition.schedule.next_due(now)?
            };
            Ok(StoredJob {
                definition: definition.clone(),
                next_due,
                created_at: job.created_at,
                updated_at: now,
            })
        }
        None => Ok(StoredJob {
            definition: definition.clone(),
            next_due: definition.schedule.next_due(now)?,
            created_at: now,
            updated_at: now,
        }),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
