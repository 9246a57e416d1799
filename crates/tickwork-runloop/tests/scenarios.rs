//! End-to-end scheduling scenarios over a real store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::mpsc;

use tickwork_runloop::{
    Dispatcher, DispatcherConfig, Scheduler, SchedulerConfig, Sweeper, SweeperConfig,
};
use tickwork_store::{
    JobDefinition, JobStore, LeaseManager, RunOutcome, RunState, ScheduleDescriptor,
    SqliteJobStore, StoreError,
};
use tickwork_workqueue::{HandlerError, HandlerRegistry, PoolConfig, RunReport, WorkerPool};

const FIVE_MINUTES: Duration = Duration::from_secs(300);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

async fn sqlite_store(dir: &TempDir) -> Arc<dyn JobStore> {
    Arc::new(SqliteJobStore::open(dir.path().join("jobs.db")).await.unwrap())
}

fn build_dispatcher(
    store: Arc<dyn JobStore>,
    holder: &str,
    pool: PoolConfig,
    registry: HandlerRegistry,
) -> (Dispatcher, Arc<WorkerPool>, mpsc::UnboundedReceiver<RunReport>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pool = Arc::new(WorkerPool::new(pool, Arc::new(registry), store.clone(), tx));
    let config = DispatcherConfig {
        holder: holder.to_string(),
        lease_duration: FIVE_MINUTES,
        ..Default::default()
    };
    (Dispatcher::new(config, store, pool.clone()), pool, rx)
}

#[tokio::test]
async fn log_message_is_due_at_sixty_seconds_not_fifty_nine() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    store
        .upsert(
            &JobDefinition::new("LogMessage", "LogMessage", ScheduleDescriptor::Interval { period_secs: 60 }),
            t0(),
        )
        .await
        .unwrap();
    let (dispatcher, _pool, _rx) = build_dispatcher(store.clone(), "a", PoolConfig::default(), HandlerRegistry::new());

    assert!(dispatcher.claim_due(t0() + secs(59)).await.unwrap().is_empty());
    let claimed = dispatcher.claim_due(t0() + secs(60)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].scheduled_for, t0() + secs(60));
}

#[tokio::test]
async fn process_job_crash_is_requeued_after_lease_expiry() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    store
        .upsert(
            &JobDefinition::new("ProcessJob", "ProcessJob", ScheduleDescriptor::recurring("* * * * *"))
                .with_payload("hello"),
            t0(),
        )
        .await
        .unwrap();
    let (dispatcher, _pool, _rx) = build_dispatcher(store.clone(), "a", PoolConfig::default(), HandlerRegistry::new());

    // Lease acquired and run claimed, then the process dies before the
    // worker reports anything.
    let claimed_at = t0() + secs(60);
    let work = dispatcher.claim_due(claimed_at).await.unwrap().remove(0);
    assert_eq!(work.payload, b"hello".to_vec());
    drop(dispatcher);

    let sweeper = Sweeper::new(SweeperConfig::default(), store.clone());
    assert_eq!(sweeper.sweep(claimed_at + secs(299)).await.unwrap().requeued, 0);
    assert_eq!(sweeper.sweep(claimed_at + secs(300)).await.unwrap().requeued, 1);

    let run = store.get_run("ProcessJob", work.scheduled_for).await.unwrap().unwrap();
    assert_eq!(run.state, RunState::Pending);
    assert_eq!(run.attempts, 1);

    // A fresh dispatcher picks the same occurrence up again.
    let (second, _pool, _rx) = build_dispatcher(store.clone(), "b", PoolConfig::default(), HandlerRegistry::new());
    let retry = second.claim_due(claimed_at + secs(301)).await.unwrap().remove(0);
    assert_eq!(retry.scheduled_for, work.scheduled_for);
    assert_eq!(retry.attempt, 1);
}

#[tokio::test]
async fn two_dispatchers_race_for_one_job() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    store
        .upsert(
            &JobDefinition::new("ProcessJob", "ProcessJob", ScheduleDescriptor::recurring("* * * * *")),
            t0(),
        )
        .await
        .unwrap();

    let leases = LeaseManager::new(store.clone());
    let now = t0() + secs(60);
    let (a, b) = tokio::join!(
        leases.acquire("ProcessJob", "dispatcher-a", FIVE_MINUTES, now),
        leases.acquire("ProcessJob", "dispatcher-b", FIVE_MINUTES, now),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(StoreError::AlreadyLeased(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn timed_out_handler_leaves_job_due_again() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let registry = HandlerRegistry::new();
    registry
        .register_fn("Slow", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .unwrap();

    let start = Utc::now();
    store
        .upsert(
            &JobDefinition::new("slow", "Slow", ScheduleDescriptor::one_shot(start)),
            start,
        )
        .await
        .unwrap();

    let pool_config = PoolConfig {
        max_workers: 1,
        job_timeout: Duration::from_millis(100),
        lease_duration: FIVE_MINUTES,
    };
    let (dispatcher, pool, mut rx) = build_dispatcher(store.clone(), "a", pool_config, registry);
    pool.start();

    assert_eq!(dispatcher.tick(Utc::now()).await.unwrap(), 1);
    let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::TimedOut);
    dispatcher.complete(&report, Utc::now()).await.unwrap();

    let run = store.get_run("slow", report.scheduled_for).await.unwrap().unwrap();
    assert_eq!(run.state, RunState::TimedOut);
    let due = store.list_due(Utc::now()).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].name(), "slow");
    assert_eq!(pool.stats().timed_out, 1);
}

#[tokio::test]
async fn double_upsert_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let def = JobDefinition::new("LogMessage", "LogMessage", ScheduleDescriptor::recurring("* * * * *"));

    let first = store.upsert(&def, t0()).await.unwrap();
    let second = store.upsert(&def, t0() + secs(45)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.list().await.unwrap(), vec![first]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduler_runs_interval_job_repeatedly() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let registry = HandlerRegistry::new();
    registry
        .register_fn("Tick", move |ctx| {
            let counter = counter.clone();
            async move {
                if ctx.payload_text() != "ping" {
                    return Err(HandlerError::InvalidPayload(ctx.payload_text().into_owned()));
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let mut config = SchedulerConfig::default();
    config.dispatcher.poll_interval = Duration::from_millis(100);
    config.sweeper.interval = Duration::from_millis(200);
    let scheduler = Scheduler::new(config, store.clone(), Arc::new(registry));
    scheduler
        .register_job("ticker", "Tick", ScheduleDescriptor::Interval { period_secs: 1 }, b"ping".to_vec())
        .await
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    scheduler.shutdown().await.unwrap();

    assert!(calls.load(Ordering::SeqCst) >= 2, "ran {} times", calls.load(Ordering::SeqCst));
    let status = scheduler.job_status("ticker").await.unwrap();
    assert!(status
        .recent_runs
        .iter()
        .all(|run| run.state != RunState::Failed));
    assert!(status.recent_runs.iter().any(|run| run.state == RunState::Succeeded));
}
