//! # tickwork workqueue
//!
//! Executes job handlers on behalf of the dispatcher.
//!
//! ## Features
//!
//! - Name-to-handler registry, with closures accepted as handlers
//! - Worker pool bounded by a semaphore
//! - Per-job timeout with task abort
//! - Lease renewal while a handler runs
//! - Outcomes written through compare-and-record on the lease token

pub mod config;
pub mod error;
pub mod handler;
pub mod worker;

pub use config::PoolConfig;
pub use error::{HandlerError, PoolError};
pub use handler::{FnHandler, HandlerRegistry, JobContext, JobHandler};
pub use worker::{PoolStats, RunReport, WorkItem, WorkerPool};
