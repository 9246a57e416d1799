//! # tickwork runloop
//!
//! The moving parts of the scheduler:
//!
//! - [`Dispatcher`] polls for due jobs, leases them and hands them to the
//!   worker pool, then reschedules when reports come back
//! - [`Sweeper`] reclaims runs whose lease expired before an outcome was
//!   written
//! - [`Scheduler`] owns registration, status queries and the lifecycle of
//!   both loops
//!
//! The loops share nothing but the job store. Every contended write goes
//! through a lease compare-and-swap or a compare-and-record on the run.

pub mod config;
pub mod dispatcher;
pub mod error;
mod reschedule;
pub mod scheduler;
pub mod sweeper;

pub use config::{DispatcherConfig, SchedulerConfig, SweeperConfig};
pub use dispatcher::Dispatcher;
pub use error::SchedulerError;
pub use scheduler::{JobStatus, Scheduler};
pub use sweeper::{SweepSummary, Sweeper};
