//! # tickwork store
//!
//! Durable state for the scheduler.
//!
//! ## Features
//!
//! - Job definitions keyed by name with upsert semantics
//! - Due-job listing ordered by due time
//! - Execution runs keyed by (job name, scheduled-for), with bounded history
//! - Lease fields updated only through compare-and-swap writes
//! - SQLite persistence, plus an in-memory store for tests
//!
//! The [`LeaseManager`] layers lease semantics (acquire, renew, release,
//! reclaim) over any [`JobStore`].

pub mod error;
pub mod lease;
pub mod model;
mod memory;
mod sqlite;
mod sqlite_schema;
pub mod store;

pub use error::StoreError;
pub use lease::LeaseManager;
pub use memory::MemoryJobStore;
pub use model::{JobDefinition, JobRun, Lease, RunOutcome, RunState, StoredJob};
pub use sqlite::SqliteJobStore;
pub use store::{JobStore, LeaseFilter, DEFAULT_HISTORY_LIMIT};
pub use tickwork_schedule::{ScheduleDescriptor, ScheduleError};
