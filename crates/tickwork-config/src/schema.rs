//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::loader::ConfigLoader;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Base directory for the database, logs and job output: `~/.tickwork`.
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".tickwork"))
            .unwrap_or_else(|| PathBuf::from(".tickwork"))
    }

    /// SQLite database file.
    pub fn store_path(&self) -> PathBuf {
        resolve(self.store.path.as_deref(), || Self::data_dir().join("tickwork.db"))
    }

    /// Directory of the rolling log files.
    pub fn log_dir(&self) -> PathBuf {
        resolve(self.logging.dir.as_deref(), || Self::data_dir().join("logs"))
    }

    /// Directory the sample handlers append to.
    pub fn output_dir(&self) -> PathBuf {
        resolve(self.jobs.output_dir.as_deref(), Self::data_dir)
    }
}

fn resolve(configured: Option<&str>, fallback: impl FnOnce() -> PathBuf) -> PathBuf {
    match configured {
        Some(path) => PathBuf::from(ConfigLoader::expand_path(path)),
        None => fallback(),
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Job store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; `~` is expanded. Defaults to `<data_dir>/tickwork.db`.
    #[serde(default)]
    pub path: Option<String>,

    /// Runs kept per job.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}

/// Dispatcher loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Lease holder identity. A random one is generated when unset.
    #[serde(default)]
    pub holder: Option<String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,

    /// Upper bound of the error backoff.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Attempts allowed per scheduled occurrence, shared with the sweeper.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            holder: None,
            poll_interval_secs: default_poll_interval_secs(),
            lease_duration_secs: default_lease_duration_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_lease_duration_secs() -> u64 {
    300
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    10
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

impl WorkersConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

fn default_max_workers() -> u32 {
    4
}

fn default_job_timeout_secs() -> u64 {
    300
}

/// Recovery sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// Built-in job handlers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Where `LogMessage` and `ProcessJob` write. Defaults to the data dir.
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub dir: Option<String>,

    /// Write daily-rolling log files besides the console.
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            file: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
