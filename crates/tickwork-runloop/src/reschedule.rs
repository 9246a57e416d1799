//! Advancing a job past a finished run.

use chrono::{DateTime, Utc};
use tracing::debug;

use tickwork_schedule::next_due;
use tickwork_store::{JobStore, StoreError};

/// Move `job_name` past the run scheduled for `anchor`.
///
/// Recurring and interval jobs get the next due time after `anchor`; if that
/// has already passed, missed occurrences collapse into one by anchoring on
/// `now` instead. One-shot jobs go dormant. Nothing happens if the job was
/// deleted or rescheduled since the run was claimed.
pub(crate) async fn advance_schedule(
    store: &dyn JobStore,
    job_name: &str,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let job = match store.get(job_name).await {
        Ok(job) => job,
        Err(StoreError::NotFound(_)) => {
            debug!("Job {} was deleted while running", job_name);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if job.next_due != Some(anchor) {
        debug!("Job {} was rescheduled while running, keeping new schedule", job_name);
        return Ok(());
    }

    let schedule = &job.definition.schedule;
    if schedule.is_one_shot() {
        debug!("One-shot job {} is now dormant", job_name);
        return store.set_schedule_state(job_name, None, false).await;
    }

    let mut next = next_due(schedule, anchor)?;
    if next.is_some_and(|due| due < now) {
        debug!("Job {} missed occurrences, coalescing", job_name);
        next = next_due(schedule, now)?;
    }
    debug!("Job {} next due at {:?}", job_name, next);
    store.set_schedule_state(job_name, next, job.definition.enabled).await
}
