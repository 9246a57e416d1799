//! SQLite job store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{JobDefinition, JobRun, Lease, RunOutcome, RunState, StoredJob};
use crate::sqlite_schema::init_schema;
use crate::store::{merge_definition, JobStore, LeaseFilter, DEFAULT_HISTORY_LIMIT};

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

const JOB_COLUMNS: &str =
    "name, handler, payload, schedule, enabled, next_due, created_at, updated_at";
const RUN_COLUMNS: &str = "job_name, scheduled_for, lease_token, lease_expires_at, state, \
     started_at, finished_at, outcome, attempts";
const LEASE_COLUMNS: &str = "job_name, token, holder, expires_at";

/// SQLite-backed job store.
///
/// Every write commits before returning. Timestamps are kept at millisecond
/// precision.
pub struct SqliteJobStore {
    conn: Connection,
    history_limit: usize,
}

impl SqliteJobStore {
    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Database(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(&path).await?;
        conn.call(|conn| init_schema(conn)).await?;
        info!("Job store opened at {}", path.display());

        Ok(Self {
            conn,
            history_limit: DEFAULT_HISTORY_LIMIT,
        })
    }

    /// Create a private in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| init_schema(conn)).await?;

        Ok(Self {
            conn,
            history_limit: DEFAULT_HISTORY_LIMIT,
        })
    }

    /// Keep at most `limit` runs per job.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }
}

fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn time_at(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn optional_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|ms| time_at(idx, ms))
        .transpose()
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn token_at(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(idx, e))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<StoredJob> {
    let schedule_json: String = row.get(3)?;
    let schedule = serde_json::from_str(&schedule_json).map_err(|e| conversion_error(3, e))?;

    Ok(StoredJob {
        definition: JobDefinition {
            name: row.get(0)?,
            handler: row.get(1)?,
            payload: row.get(2)?,
            schedule,
            enabled: row.get(4)?,
        },
        next_due: optional_time(row, 5)?,
        created_at: time_at(6, row.get(6)?)?,
        updated_at: time_at(7, row.get(7)?)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<JobRun> {
    let lease_token = row
        .get::<_, Option<String>>(2)?
        .map(|raw| token_at(2, &raw))
        .transpose()?;
    let state: String = row.get(4)?;
    let state = state.parse::<RunState>().map_err(|e| conversion_error(4, e))?;
    let outcome = row
        .get::<_, Option<String>>(7)?
        .map(|raw| serde_json::from_str::<RunOutcome>(&raw).map_err(|e| conversion_error(7, e)))
        .transpose()?;

    Ok(JobRun {
        job_name: row.get(0)?,
        scheduled_for: time_at(1, row.get(1)?)?,
        lease_token,
        lease_expires_at: optional_time(row, 3)?,
        state,
        started_at: optional_time(row, 5)?,
        finished_at: optional_time(row, 6)?,
        outcome,
        attempts: row.get(8)?,
    })
}

fn lease_from_row(row: &Row<'_>) -> rusqlite::Result<Lease> {
    let token: String = row.get(1)?;
    Ok(Lease {
        job_name: row.get(0)?,
        token: token_at(1, &token)?,
        holder: row.get(2)?,
        expires_at: time_at(3, row.get(3)?)?,
    })
}

fn load_job(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<Option<StoredJob>> {
    conn.query_row(
        &format!("SELECT {} FROM job_definitions WHERE name = ?1", JOB_COLUMNS),
        [name],
        job_from_row,
    )
    .optional()
}

fn write_job(conn: &rusqlite::Connection, job: &StoredJob) -> Result<(), tokio_rusqlite::Error> {
    let schedule = serde_json::to_string(&job.definition.schedule)
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
    conn.execute(
        "INSERT OR REPLACE INTO job_definitions
         (name, handler, payload, schedule, enabled, next_due, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            job.definition.name,
            job.definition.handler,
            job.definition.payload,
            schedule,
            job.definition.enabled,
            job.next_due.map(millis),
            millis(job.created_at),
            millis(job.updated_at),
        ],
    )?;
    Ok(())
}

fn write_run(
    conn: &rusqlite::Connection,
    run: &JobRun,
    history_limit: usize,
) -> Result<(), tokio_rusqlite::Error> {
    let outcome = run
        .outcome
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
    conn.execute(
        "INSERT OR REPLACE INTO job_runs
         (job_name, scheduled_for, lease_token, lease_expires_at, state,
          started_at, finished_at, outcome, attempts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.job_name,
            millis(run.scheduled_for),
            run.lease_token.map(|t| t.to_string()),
            run.lease_expires_at.map(millis),
            run.state.as_str(),
            run.started_at.map(millis),
            run.finished_at.map(millis),
            outcome,
            run.attempts,
        ],
    )?;

    let pruned = conn.execute(
        "DELETE FROM job_runs WHERE job_name = ?1 AND scheduled_for NOT IN (
             SELECT scheduled_for FROM job_runs WHERE job_name = ?1
             ORDER BY scheduled_for DESC LIMIT ?2
         )",
        params![run.job_name, history_limit as i64],
    )?;
    if pruned > 0 {
        debug!("Pruned {} old runs of job {}", pruned, run.job_name);
    }
    Ok(())
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn upsert(
        &self,
        definition: &JobDefinition,
        now: DateTime<Utc>,
    ) -> Result<StoredJob, StoreError> {
        let definition = definition.clone();
        let merged = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing = load_job(&tx, &definition.name)?;
                let merged = match merge_definition(existing.as_ref(), &definition, now) {
                    Ok(merged) => merged,
                    Err(e) => return Ok(Err(e)),
                };
                if existing.as_ref() != Some(&merged) {
                    write_job(&tx, &merged)?;
                }
                tx.commit()?;
                Ok(Ok(merged))
            })
            .await?;
        Ok(merged?)
    }

    async fn get(&self, name: &str) -> Result<StoredJob, StoreError> {
        let name = name.to_string();
        let lookup = name.clone();
        self.conn
            .call(move |conn| Ok(load_job(conn, &lookup)?))
            .await?
            .ok_or(StoreError::NotFound(name))
    }

    async fn list(&self) -> Result<Vec<StoredJob>, StoreError> {
        let jobs = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM job_definitions ORDER BY name",
                    JOB_COLUMNS
                ))?;
                let jobs = stmt
                    .query_map([], job_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(jobs)
            })
            .await?;
        Ok(jobs)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<StoredJob>, StoreError> {
        let jobs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM job_definitions
                     WHERE enabled = 1 AND next_due IS NOT NULL AND next_due <= ?1
                     ORDER BY next_due, name",
                    JOB_COLUMNS
                ))?;
                let jobs = stmt
                    .query_map([millis(now)], job_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(jobs)
            })
            .await?;
        Ok(jobs)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        let lookup = name.clone();
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let deleted = tx.execute("DELETE FROM job_definitions WHERE name = ?1", [&lookup])?;
                tx.execute("DELETE FROM job_leases WHERE job_name = ?1", [&lookup])?;
                tx.execute("DELETE FROM job_runs WHERE job_name = ?1", [&lookup])?;
                tx.commit()?;
                Ok(deleted)
            })
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound(name));
        }
        Ok(())
    }

    async fn set_schedule_state(
        &self,
        name: &str,
        next_due: Option<DateTime<Utc>>,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let name = name.to_string();
        let lookup = name.clone();
        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE job_definitions SET next_due = ?1, enabled = ?2 WHERE name = ?3",
                    params![next_due.map(millis), enabled, lookup],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(StoreError::NotFound(name));
        }
        Ok(())
    }

    async fn record_run(&self, run: &JobRun) -> Result<(), StoreError> {
        let run = run.clone();
        let limit = self.history_limit;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                write_run(&tx, &run, limit)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn compare_and_record_run(
        &self,
        run: &JobRun,
        expected_token: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        let run = run.clone();
        let limit = self.history_limit;
        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current: Option<Option<String>> = tx
                    .query_row(
                        "SELECT lease_token FROM job_runs WHERE job_name = ?1 AND scheduled_for = ?2",
                        params![run.job_name, millis(run.scheduled_for)],
                        |row| row.get(0),
                    )
                    .optional()?;

                let expected = expected_token.map(|t| t.to_string());
                let matches = match current {
                    Some(stored) => stored == expected,
                    None => expected.is_none(),
                };
                if !matches {
                    return Ok(false);
                }

                write_run(&tx, &run, limit)?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(written)
    }

    async fn get_run(
        &self,
        job_name: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<JobRun>, StoreError> {
        let job_name = job_name.to_string();
        let run = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM job_runs WHERE job_name = ?1 AND scheduled_for = ?2",
                            RUN_COLUMNS
                        ),
                        params![job_name, millis(scheduled_for)],
                        run_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(run)
    }

    async fn recent_runs(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, StoreError> {
        let job_name = job_name.to_string();
        let runs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM job_runs WHERE job_name = ?1
                     ORDER BY scheduled_for DESC LIMIT ?2",
                    RUN_COLUMNS
                ))?;
                let runs = stmt
                    .query_map(params![job_name, limit as i64], run_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(runs)
            })
            .await?;
        Ok(runs)
    }

    async fn stale_runs(&self, now: DateTime<Utc>) -> Result<Vec<JobRun>, StoreError> {
        let runs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM job_runs
                     WHERE state IN ('leased', 'running')
                       AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?1
                     ORDER BY lease_expires_at, job_name",
                    RUN_COLUMNS
                ))?;
                let runs = stmt
                    .query_map([millis(now)], run_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(runs)
            })
            .await?;
        Ok(runs)
    }

    async fn try_lease(&self, lease: &Lease, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let lease = lease.clone();
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "INSERT INTO job_leases (job_name, token, holder, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(job_name) DO UPDATE SET
                         token = excluded.token,
                         holder = excluded.holder,
                         expires_at = excluded.expires_at
                     WHERE job_leases.expires_at <= ?5",
                    params![
                        lease.job_name,
                        lease.token.to_string(),
                        lease.holder,
                        millis(lease.expires_at),
                        millis(now),
                    ],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    async fn extend_lease(
        &self,
        token: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, StoreError> {
        let lease = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let lease = tx
                    .query_row(
                        &format!(
                            "UPDATE job_leases SET expires_at = ?1
                             WHERE token = ?2 AND expires_at > ?3
                             RETURNING {}",
                            LEASE_COLUMNS
                        ),
                        params![millis(expires_at), token.to_string(), millis(now)],
                        lease_from_row,
                    )
                    .optional()?;
                if lease.is_some() {
                    tx.execute(
                        "UPDATE job_runs SET lease_expires_at = ?1 WHERE lease_token = ?2",
                        params![millis(expires_at), token.to_string()],
                    )?;
                }
                tx.commit()?;
                Ok(lease)
            })
            .await?;
        Ok(lease)
    }

    async fn clear_lease(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
        filter: LeaseFilter,
    ) -> Result<Option<Lease>, StoreError> {
        let condition = match filter {
            LeaseFilter::Live => "expires_at > ?2",
            LeaseFilter::Expired => "expires_at <= ?2",
        };
        let sql = format!(
            "DELETE FROM job_leases WHERE token = ?1 AND {} RETURNING {}",
            condition, LEASE_COLUMNS
        );
        let lease = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(&sql, params![token.to_string(), millis(now)], lease_from_row)
                    .optional()?)
            })
            .await?;
        Ok(lease)
    }

    async fn get_lease(&self, job_name: &str) -> Result<Option<Lease>, StoreError> {
        let job_name = job_name.to_string();
        let lease = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM job_leases WHERE job_name = ?1", LEASE_COLUMNS),
                        [job_name],
                        lease_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(lease)
    }
}
