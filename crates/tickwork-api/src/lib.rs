//! # tickwork API
//!
//! HTTP surface of the scheduler.
//!
//! ```text
//! /api/job
//!   POST   /api/job/start-recurring-job - Schedule LogMessage every minute
//!   POST   /api/job/schedule-job        - Schedule a registered handler by cron
//!
//! /api/jobs
//!   GET    /api/jobs          - List jobs
//!   GET    /api/jobs/{name}   - Job status with recent runs
//!   DELETE /api/jobs/{name}   - Delete job
//!
//! /health                     - Liveness and worker counters
//! ```

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, JobRequest};
pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
