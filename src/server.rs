//! Process wiring: logging, store, scheduler and HTTP server.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use tickwork_api::{ApiConfig, ApiServer, AppState};
use tickwork_config::{Config, ValidationWarning};
use tickwork_runloop::{DispatcherConfig, Scheduler, SchedulerConfig, SweeperConfig};
use tickwork_store::{JobStore, SqliteJobStore};
use tickwork_workqueue::{HandlerRegistry, PoolConfig};

use crate::jobs::register_builtin_handlers;

/// Initialize tracing with console and, if enabled, daily-rolling file output.
///
/// `RUST_LOG` takes precedence over `logging.level`.
pub(crate) fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let file_layer = if config.logging.file {
        let log_dir = config.log_dir();
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("tickwork")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&log_dir)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The guard flushes on drop, so it lives for the whole process.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false).boxed())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

pub(crate) fn log_warnings(warnings: &[ValidationWarning]) {
    for warning in warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
}

/// Translate the file configuration into loop settings.
pub(crate) fn scheduler_config(config: &Config) -> SchedulerConfig {
    let mut dispatcher = DispatcherConfig {
        poll_interval: config.dispatcher.poll_interval(),
        lease_duration: config.dispatcher.lease_duration(),
        max_attempts: config.dispatcher.max_attempts,
        max_backoff: config.dispatcher.max_backoff(),
        ..Default::default()
    };
    if let Some(holder) = &config.dispatcher.holder {
        dispatcher.holder = holder.clone();
    }

    SchedulerConfig {
        dispatcher,
        sweeper: SweeperConfig {
            interval: config.sweeper.interval(),
            max_attempts: config.dispatcher.max_attempts,
        },
        pool: PoolConfig {
            max_workers: config.workers.max_workers,
            job_timeout: config.workers.job_timeout(),
            lease_duration: config.dispatcher.lease_duration(),
        },
        status_history: 0,
    }
}

/// Open the configured store and build a scheduler over it with the
/// built-in handlers registered.
pub(crate) async fn build_scheduler(config: &Config) -> Result<Arc<Scheduler>, Box<dyn std::error::Error>> {
    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::open(config.store_path())
            .await?
            .with_history_limit(config.store.history_limit),
    );

    let output_dir = config.output_dir();
    tokio::fs::create_dir_all(&output_dir).await?;
    let registry = HandlerRegistry::new();
    register_builtin_handlers(&registry, &output_dir)?;

    Ok(Arc::new(Scheduler::new(
        scheduler_config(config),
        store,
        Arc::new(registry),
    )))
}

/// Run the scheduler loops and HTTP API until Ctrl-C.
pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting tickwork v{}", env!("CARGO_PKG_VERSION"));

    let scheduler = build_scheduler(&config).await?;
    scheduler.start().await?;

    let server = ApiServer::new(
        ApiConfig::new(config.server.host.clone(), config.server.port),
        Arc::new(AppState::new(scheduler.clone())),
    );
    let served = server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await;

    scheduler.shutdown().await?;
    served
}
