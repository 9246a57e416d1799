//! Scheduler facade: registration, status and loop lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use tickwork_schedule::next_due;
use tickwork_store::{
    JobDefinition, JobRun, JobStore, Lease, LeaseManager, ScheduleDescriptor, StoredJob,
};
use tickwork_workqueue::{HandlerRegistry, PoolStats, WorkerPool};

use crate::config::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::SchedulerError;
use crate::sweeper::Sweeper;

/// Upcoming due times listed in a job status.
const UPCOMING_LIMIT: usize = 5;

/// Everything known about one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job: StoredJob,
    /// The live lease, if the job is executing.
    pub lease: Option<Lease>,
    /// Newest first.
    pub recent_runs: Vec<JobRun>,
    /// The next few due times, starting with `job.next_due`.
    pub upcoming: Vec<DateTime<Utc>>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    pool: Arc<WorkerPool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Entry point for embedding applications.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    leases: LeaseManager,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn JobStore>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            leases: LeaseManager::new(store.clone()),
            config,
            store,
            registry,
            running: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Create or update a job.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::UnknownHandler`] if `handler` is not registered
    /// - [`SchedulerError::Store`] wrapping `InvalidSchedule` for a bad
    ///   schedule, or any store failure
    #[tracing::instrument(skip(self, schedule, payload), fields(schedule = %schedule))]
    pub async fn register_job(
        &self,
        name: &str,
        handler: &str,
        schedule: ScheduleDescriptor,
        payload: Vec<u8>,
    ) -> Result<StoredJob, SchedulerError> {
        if !self.registry.contains(handler) {
            return Err(SchedulerError::UnknownHandler(handler.to_string()));
        }

        let definition = JobDefinition::new(name, handler, schedule).with_payload(payload);
        let job = self.store.upsert(&definition, Utc::now()).await?;
        info!("Job {} registered, next due {:?}", name, job.next_due);
        Ok(job)
    }

    /// Delete a job with its lease and history.
    pub async fn remove_job(&self, name: &str) -> Result<(), SchedulerError> {
        self.store.delete(name).await?;
        info!("Job {} removed", name);
        Ok(())
    }

    /// All jobs, by name.
    pub async fn list_jobs(&self) -> Result<Vec<StoredJob>, SchedulerError> {
        Ok(self.store.list().await?)
    }

    /// Definition, next due times, live lease and recent runs of a job.
    pub async fn job_status(&self, name: &str) -> Result<JobStatus, SchedulerError> {
        let job = self.store.get(name).await?;
        let now = Utc::now();
        let lease = self.leases.current(name, now).await?;
        let recent_runs = self
            .store
            .recent_runs(name, self.config.status_history())
            .await?;

        Ok(JobStatus {
            upcoming: upcoming(&job, UPCOMING_LIMIT),
            job,
            lease,
            recent_runs,
        })
    }

    /// Start the worker pool, dispatcher and sweeper.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(WorkerPool::new(
            self.config.pool.clone(),
            self.registry.clone(),
            self.store.clone(),
            report_tx,
        ));
        pool.start();

        let dispatcher = Arc::new(Dispatcher::new(
            self.config.dispatcher.clone(),
            self.store.clone(),
            pool.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(self.config.sweeper.clone(), self.store.clone()));

        let (shutdown, cancel) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(dispatcher.run(report_rx, cancel.clone())),
            tokio::spawn(sweeper.run(cancel)),
        ];

        *running = Some(Running {
            shutdown,
            pool,
            tasks,
        });
        info!("Scheduler started");
        Ok(())
    }

    /// Stop both loops and wait for them to exit. Handlers already running
    /// finish in the background; their leases expire if nobody completes them.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let Some(running) = self.running.lock().await.take() else {
            return Err(SchedulerError::NotRunning);
        };

        running.pool.stop();
        let _ = running.shutdown.send(true);
        for task in running.tasks {
            if let Err(e) = task.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Worker counters, if running.
    pub async fn stats(&self) -> Option<PoolStats> {
        self.running.lock().await.as_ref().map(|r| r.pool.stats())
    }
}

fn upcoming(job: &StoredJob, limit: usize) -> Vec<DateTime<Utc>> {
    let schedule = &job.definition.schedule;
    let mut times = Vec::new();
    let mut cursor = job.next_due.filter(|_| job.definition.enabled);

    while let Some(due) = cursor {
        if times.len() == limit {
            break;
        }
        times.push(due);
        if schedule.is_one_shot() {
            break;
        }
        cursor = next_due(schedule, due).ok().flatten();
    }
    times
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
