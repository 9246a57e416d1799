use super::*;
use chrono::{Duration, TimeZone};
use tempfile::TempDir;

use tickwork_schedule::ScheduleDescriptor;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn process_job() -> JobDefinition {
    JobDefinition::new("ProcessJob", "ProcessJob", ScheduleDescriptor::recurring("* * * * *"))
        .with_payload("hello")
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.db");

    let token = {
        let store = SqliteJobStore::open(&path).await.unwrap();
        store.upsert(&process_job(), t0()).await.unwrap();

        let lease = Lease::new("ProcessJob", "dispatcher-1", t0() + Duration::minutes(5));
        assert!(store.try_lease(&lease, t0()).await.unwrap());

        let mut run = JobRun::new("ProcessJob", t0() + Duration::minutes(1));
        run.lease(&lease);
        store.record_run(&run).await.unwrap();
        lease.token
    };

    let store = SqliteJobStore::open(&path).await.unwrap();
    let job = store.get("ProcessJob").await.unwrap();
    assert_eq!(job.definition, process_job());
    assert_eq!(job.next_due, Some(t0() + Duration::minutes(1)));

    let lease = store.get_lease("ProcessJob").await.unwrap().unwrap();
    assert_eq!(lease.token, token);
    assert_eq!(lease.holder, "dispatcher-1");

    let run = store
        .get_run("ProcessJob", t0() + Duration::minutes(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.state, RunState::Leased);
    assert_eq!(run.lease_token, Some(token));
}

#[tokio::test]
async fn test_concurrent_compare_and_record_across_connections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.db");
    let first = SqliteJobStore::open(&path).await.unwrap();
    let second = SqliteJobStore::open(&path).await.unwrap();

    let lease = Lease::new("ProcessJob", "dispatcher-1", t0() + Duration::minutes(5));
    let mut run = JobRun::new("ProcessJob", t0());
    run.lease(&lease);
    run.start(t0());
    first.record_run(&run).await.unwrap();

    let mut succeeded = run.clone();
    succeeded.finish(RunOutcome::Succeeded, t0() + Duration::seconds(1));
    let mut failed = run.clone();
    failed.finish(RunOutcome::failed("boom"), t0() + Duration::seconds(2));

    let (a, b) = tokio::join!(
        first.compare_and_record_run(&succeeded, Some(lease.token)),
        second.compare_and_record_run(&failed, Some(lease.token)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a ^ b, "exactly one writer must win: {} {}", a, b);

    let stored = first.get_run("ProcessJob", t0()).await.unwrap().unwrap();
    let winner = if a { succeeded } else { failed };
    assert_eq!(stored.outcome, winner.outcome);
    assert!(stored.lease_token.is_none());
}

#[tokio::test]
async fn test_open_creates_parent_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("jobs.db");
    SqliteJobStore::open(&path).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_timestamps_keep_millisecond_precision() {
    let store = SqliteJobStore::in_memory().await.unwrap();
    let scheduled = t0() + Duration::milliseconds(1234);
    let mut run = JobRun::new("j", scheduled);
    run.finish(RunOutcome::failed("boom"), scheduled + Duration::milliseconds(5));
    store.record_run(&run).await.unwrap();

    let loaded = store.get_run("j", scheduled).await.unwrap().unwrap();
    assert_eq!(loaded, run);
}

#[tokio::test]
async fn test_corrupt_schedule_surfaces_as_database_error() {
    let store = SqliteJobStore::in_memory().await.unwrap();
    store.upsert(&process_job(), t0()).await.unwrap();
    store
        .conn
        .call(|conn| {
            conn.execute("UPDATE job_definitions SET schedule = 'not json'", [])?;
            Ok(())
        })
        .await
        .unwrap();

    let err = store.get("ProcessJob").await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));
}
