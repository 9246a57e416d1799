//! # tickwork schedule
//!
//! Pure next-due computation for job schedules.
//!
//! Three kinds of schedule are supported:
//!
//! - **Recurring**: a 5-field (`minute hour dom month dow`) or 6-field
//!   (`second minute hour dom month dow`) cron expression
//! - **Interval**: a fixed period in seconds
//! - **OneShot**: a single instant
//!
//! All computation happens in UTC.

mod cron_expr;
mod descriptor;
mod error;
pub mod presets;

pub use cron_expr::CronSchedule;
pub use descriptor::{next_due, ScheduleDescriptor};
pub use error::ScheduleError;
