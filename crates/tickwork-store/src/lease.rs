//! Lease manager.
//!
//! A lease is an exclusive, time-bounded claim on running one job. Leases are
//! granted through a compare-and-swap on the store, so any number of
//! dispatchers sharing a store see at most one live lease per job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::Lease;
use crate::store::{JobStore, LeaseFilter};

/// Grants, renews and releases leases held in a [`JobStore`].
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn JobStore>,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Acquire a lease on `job_name` lasting `duration` from `now`.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyLeased`] if another unexpired lease exists.
    pub async fn acquire(
        &self,
        job_name: &str,
        holder: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lease, StoreError> {
        let lease = Lease::new(job_name, holder, expiry(now, duration)?);
        if self.store.try_lease(&lease, now).await? {
            debug!("Lease {} on job {} granted to {}", lease.token, job_name, holder);
            Ok(lease)
        } else {
            Err(StoreError::AlreadyLeased(job_name.to_string()))
        }
    }

    /// Push a live lease's expiry to `now + extension`.
    ///
    /// # Errors
    ///
    /// [`StoreError::LeaseExpired`] if the lease is gone or already expired.
    pub async fn renew(
        &self,
        token: Uuid,
        extension: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lease, StoreError> {
        self.store
            .extend_lease(token, expiry(now, extension)?, now)
            .await?
            .ok_or(StoreError::LeaseExpired(token))
    }

    /// Give up a live lease.
    ///
    /// # Errors
    ///
    /// [`StoreError::LeaseExpired`] if the lease expired before release.
    pub async fn release(&self, token: Uuid, now: DateTime<Utc>) -> Result<Lease, StoreError> {
        self.store
            .clear_lease(token, now, LeaseFilter::Live)
            .await?
            .ok_or(StoreError::LeaseExpired(token))
    }

    /// Clear an expired lease. Returns `None` when the token no longer names
    /// an expired lease (released, renewed or replaced).
    pub async fn reclaim(&self, token: Uuid, now: DateTime<Utc>) -> Result<Option<Lease>, StoreError> {
        self.store.clear_lease(token, now, LeaseFilter::Expired).await
    }

    /// The live lease on a job, if any.
    pub async fn current(&self, job_name: &str, now: DateTime<Utc>) -> Result<Option<Lease>, StoreError> {
        Ok(self
            .store
            .get_lease(job_name)
            .await?
            .filter(|lease| !lease.is_expired(now)))
    }
}

fn expiry(now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>, StoreError> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| StoreError::InvalidLease(format!("lease duration {:?} is too large", duration)))
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
