//! Built-in job handlers.
//!
//! `LogMessage` and `ProcessJob` append one line per run to a text file in
//! the configured output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use tickwork_workqueue::{HandlerError, HandlerRegistry, JobContext, JobHandler, PoolError};

pub(crate) const LOG_MESSAGE: &str = "LogMessage";
pub(crate) const PROCESS_JOB: &str = "ProcessJob";

/// Appends "Recurring job executed at ..." to `Sample3.txt`.
pub(crate) struct LogMessage {
    output: PathBuf,
}

impl LogMessage {
    pub(crate) fn new(output_dir: &Path) -> Self {
        Self {
            output: output_dir.join("Sample3.txt"),
        }
    }
}

#[async_trait]
impl JobHandler for LogMessage {
    async fn handle(&self, ctx: JobContext) -> Result<(), HandlerError> {
        debug!("LogMessage run for {}", ctx.scheduled_for);
        append_line(&self.output, &format!("Recurring job executed at {}", timestamp())).await
    }
}

/// Appends the payload to `Sample2.txt`.
pub(crate) struct ProcessJob {
    output: PathBuf,
}

impl ProcessJob {
    pub(crate) fn new(output_dir: &Path) -> Self {
        Self {
            output: output_dir.join("Sample2.txt"),
        }
    }
}

#[async_trait]
impl JobHandler for ProcessJob {
    async fn handle(&self, ctx: JobContext) -> Result<(), HandlerError> {
        let line = format!(
            "Processing job with input: {} at {}",
            ctx.payload_text(),
            timestamp()
        );
        append_line(&self.output, &line).await
    }
}

/// Register both handlers, writing into `output_dir`.
pub(crate) fn register_builtin_handlers(
    registry: &HandlerRegistry,
    output_dir: &Path,
) -> Result<(), PoolError> {
    registry.register(LOG_MESSAGE, Arc::new(LogMessage::new(output_dir)))?;
    registry.register(PROCESS_JOB, Arc::new(ProcessJob::new(output_dir)))?;
    Ok(())
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

async fn append_line(path: &Path, line: &str) -> Result<(), HandlerError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{}\n", line).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
