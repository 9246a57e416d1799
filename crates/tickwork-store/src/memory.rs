//! In-memory job store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{JobDefinition, JobRun, Lease, StoredJob};
use crate::store::{merge_definition, JobStore, LeaseFilter, DEFAULT_HISTORY_LIMIT};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<String, StoredJob>,
    leases: HashMap<String, Lease>,
    runs: HashMap<String, BTreeMap<DateTime<Utc>, JobRun>>,
}

impl MemoryState {
    fn prune(&mut self, job_name: &str, limit: usize) {
        if let Some(runs) = self.runs.get_mut(job_name) {
            while runs.len() > limit {
                runs.pop_first();
            }
        }
    }
}

/// Job store kept in process memory. Nothing survives a restart.
pub struct MemoryJobStore {
    state: RwLock<MemoryState>,
    history_limit: usize,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create an empty store keeping `limit` runs per job.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            history_limit: limit.max(1),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert(
        &self,
        definition: &JobDefinition,
        now: DateTime<Utc>,
    ) -> Result<StoredJob, StoreError> {
        let mut state = self.state.write();
        let merged = merge_definition(state.jobs.get(&definition.name), definition, now)?;
        state.jobs.insert(definition.name.clone(), merged.clone());
        Ok(merged)
    }

    async fn get(&self, name: &str) -> Result<StoredJob, StoreError> {
        let state = self.state.read();
        state
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<StoredJob>, StoreError> {
        let state = self.state.read();
        let mut jobs: Vec<StoredJob> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(jobs)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<StoredJob>, StoreError> {
        let state = self.state.read();
        let mut due: Vec<StoredJob> = state
            .jobs
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_due.cmp(&b.next_due).then_with(|| a.name().cmp(b.name())));
        Ok(due)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.jobs.remove(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        state.leases.remove(name);
        state.runs.remove(name);
        Ok(())
    }

    async fn set_schedule_state(
        &self,
        name: &str,
        next_due: Option<DateTime<Utc>>,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let job = state
            .jobs
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        job.next_due = next_due;
        job.definition.enabled = enabled;
        Ok(())
    }

    async fn record_run(&self, run: &JobRun) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state
            .runs
            .entry(run.job_name.clone())
            .or_default()
            .insert(run.scheduled_for, run.clone());
        state.prune(&run.job_name, self.history_limit);
        Ok(())
    }

    async fn compare_and_record_run(
        &self,
        run: &JobRun,
        expected_token: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        let current = state
            .runs
            .get(&run.job_name)
            .and_then(|runs| runs.get(&run.scheduled_for));
        let matches = match current {
            Some(stored) => stored.lease_token == expected_token,
            None => expected_token.is_none(),
        };
        if !matches {
            return Ok(false);
        }
        state
            .runs
            .entry(run.job_name.clone())
            .or_default()
            .insert(run.scheduled_for, run.clone());
        state.prune(&run.job_name, self.history_limit);
        Ok(true)
    }

    async fn get_run(
        &self,
        job_name: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<JobRun>, StoreError> {
        let state = self.state.read();
        Ok(state
            .runs
            .get(job_name)
            .and_then(|runs| runs.get(&scheduled_for))
            .cloned())
    }

    async fn recent_runs(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, StoreError> {
        let state = self.state.read();
        Ok(state
            .runs
            .get(job_name)
            .map(|runs| runs.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn stale_runs(&self, now: DateTime<Utc>) -> Result<Vec<JobRun>, StoreError> {
        let state = self.state.read();
        let mut stale: Vec<JobRun> = state
            .runs
            .values()
            .flat_map(|runs| runs.values())
            .filter(|run| run.state.is_in_flight() && run.is_lease_expired(now))
            .cloned()
            .collect();
        stale.sort_by(|a, b| {
            a.lease_expires_at
                .cmp(&b.lease_expires_at)
                .then_with(|| a.job_name.cmp(&b.job_name))
        });
        Ok(stale)
    }

    async fn try_lease(&self, lease: &Lease, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        if let Some(current) = state.leases.get(&lease.job_name) {
            if !current.is_expired(now) {
                return Ok(false);
            }
        }
        state.leases.insert(lease.job_name.clone(), lease.clone());
        Ok(true)
    }

    async fn extend_lease(
        &self,
        token: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, StoreError> {
        let mut state = self.state.write();
        let Some(lease) = state
            .leases
            .values_mut()
            .find(|lease| lease.token == token && !lease.is_expired(now))
        else {
            return Ok(None);
        };
        lease.expires_at = expires_at;
        let lease = lease.clone();

        if let Some(runs) = state.runs.get_mut(&lease.job_name) {
            for run in runs.values_mut().filter(|run| run.lease_token == Some(token)) {
                run.lease_expires_at = Some(expires_at);
            }
        }
        Ok(Some(lease))
    }

    async fn clear_lease(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
        filter: LeaseFilter,
    ) -> Result<Option<Lease>, StoreError> {
        let mut state = self.state.write();
        let job_name = state
            .leases
            .values()
            .find(|lease| lease.token == token && filter.matches(lease, now))
            .map(|lease| lease.job_name.clone());
        Ok(job_name.and_then(|name| state.leases.remove(&name)))
    }

    async fn get_lease(&self, job_name: &str) -> Result<Option<Lease>, StoreError> {
        let state = self.state.read();
        Ok(state.leases.get(job_name).cloned())
    }
}
