//! Job definitions, execution runs and leases.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tickwork_schedule::ScheduleDescriptor;

fn default_true() -> bool {
    true
}

/// What to run and when. The name is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Unique job name.
    pub name: String,
    /// Key into the handler registry.
    pub handler: String,
    /// Opaque input handed to the handler.
    #[serde(default)]
    pub payload: Vec<u8>,
    /// When the job runs.
    pub schedule: ScheduleDescriptor,
    /// Disabled jobs are kept but never due.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl JobDefinition {
    /// Create an enabled job with an empty payload.
    pub fn new(
        name: impl Into<String>,
        handler: impl Into<String>,
        schedule: ScheduleDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            payload: Vec::new(),
            schedule,
            enabled: true,
        }
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set enabled state.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// A definition as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredJob {
    pub definition: JobDefinition,
    /// Next time the job is due. `None` once a one-shot job has run or when
    /// a cron expression never fires again.
    pub next_due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredJob {
    /// Job name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Whether the job is enabled and due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.definition.enabled && self.next_due.is_some_and(|due| due <= now)
    }
}

/// Execution state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Due, waiting for a lease.
    Pending,
    /// Leased by a dispatcher, waiting for a worker.
    Leased,
    /// A worker is executing the handler.
    Running,
    /// Handler returned success.
    Succeeded,
    /// Handler failed, or the run exhausted its attempts.
    Failed,
    /// Handler exceeded its timeout.
    TimedOut,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Leased => "leased",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::TimedOut => "timed_out",
        }
    }

    /// A terminal state has an outcome recorded.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::TimedOut
        )
    }

    /// Leased or running: holds a lease that the sweeper may reclaim.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RunState::Leased | RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunState::Pending),
            "leased" => Ok(RunState::Leased),
            "running" => Ok(RunState::Running),
            "succeeded" => Ok(RunState::Succeeded),
            "failed" => Ok(RunState::Failed),
            "timed_out" => Ok(RunState::TimedOut),
            other => Err(format!("unknown run state: {}", other)),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed { error: String },
    TimedOut,
}

impl RunOutcome {
    /// Failure with an error detail.
    pub fn failed(error: impl Into<String>) -> Self {
        RunOutcome::Failed {
            error: error.into(),
        }
    }

    /// Terminal state matching this outcome.
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Succeeded => RunState::Succeeded,
            RunOutcome::Failed { .. } => RunState::Failed,
            RunOutcome::TimedOut => RunState::TimedOut,
        }
    }
}

/// One execution of a job for a given due time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_name: String,
    pub scheduled_for: DateTime<Utc>,
    pub lease_token: Option<Uuid>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    /// Attempts that ended without a recorded outcome (lease expiry or
    /// timeout).
    pub attempts: u32,
}

impl JobRun {
    /// A fresh pending run.
    pub fn new(job_name: impl Into<String>, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            job_name: job_name.into(),
            scheduled_for,
            lease_token: None,
            lease_expires_at: None,
            state: RunState::Pending,
            started_at: None,
            finished_at: None,
            outcome: None,
            attempts: 0,
        }
    }

    /// Attach a lease.
    pub fn lease(&mut self, lease: &Lease) {
        self.state = RunState::Leased;
        self.lease_token = Some(lease.token);
        self.lease_expires_at = Some(lease.expires_at);
    }

    /// A worker started the handler.
    pub fn start(&mut self, at: DateTime<Utc>) {
        self.state = RunState::Running;
        self.started_at = Some(at);
        self.finished_at = None;
    }

    /// Record the outcome and drop the lease fields.
    pub fn finish(&mut self, outcome: RunOutcome, at: DateTime<Utc>) {
        self.state = outcome.state();
        self.outcome = Some(outcome);
        self.finished_at = Some(at);
        self.lease_token = None;
        self.lease_expires_at = None;
    }

    /// Return to pending after an abandoned or timed-out attempt.
    pub fn requeue(&mut self) {
        self.state = RunState::Pending;
        self.attempts += 1;
        self.lease_token = None;
        self.lease_expires_at = None;
        self.started_at = None;
        self.finished_at = None;
        self.outcome = None;
    }

    /// The run has used up its attempts.
    pub fn exhaust(&mut self, at: DateTime<Utc>) {
        self.finish(RunOutcome::failed("max attempts exceeded"), at);
    }

    /// Whether the run's lease has run out at `now`.
    pub fn is_lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|expiry| expiry <= now)
    }
}

/// Exclusive, time-bounded claim on executing a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub job_name: String,
    pub token: Uuid,
    /// Identity of the dispatcher holding the lease.
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// A lease with a fresh token.
    pub fn new(
        job_name: impl Into<String>,
        holder: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            token: Uuid::new_v4(),
            holder: holder.into(),
            expires_at,
        }
    }

    /// Expired leases no longer grant exclusivity.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
