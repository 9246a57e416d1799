use super::*;
use chrono::TimeZone;

use crate::memory::MemoryJobStore;
use crate::model::JobRun;
use crate::sqlite::SqliteJobStore;

const FIVE_MINUTES: Duration = Duration::from_secs(300);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

fn manager() -> LeaseManager {
    LeaseManager::new(Arc::new(MemoryJobStore::new()))
}

#[tokio::test]
async fn test_acquire_then_conflict() {
    let leases = manager();
    let lease = leases.acquire("ProcessJob", "a", FIVE_MINUTES, t0()).await.unwrap();
    assert_eq!(lease.expires_at, t0() + secs(300));
    assert_eq!(lease.holder, "a");

    let err = leases
        .acquire("ProcessJob", "b", FIVE_MINUTES, t0() + secs(299))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyLeased(name) if name == "ProcessJob"));
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over() {
    let leases = manager();
    let first = leases.acquire("j", "a", FIVE_MINUTES, t0()).await.unwrap();
    let second = leases.acquire("j", "b", FIVE_MINUTES, t0() + secs(300)).await.unwrap();
    assert_ne!(first.token, second.token);

    let current = leases.current("j", t0() + secs(301)).await.unwrap().unwrap();
    assert_eq!(current.token, second.token);
}

#[tokio::test]
async fn test_renew_extends_from_now() {
    let leases = manager();
    let lease = leases.acquire("j", "a", FIVE_MINUTES, t0()).await.unwrap();
    let renewed = leases.renew(lease.token, FIVE_MINUTES, t0() + secs(100)).await.unwrap();
    assert_eq!(renewed.expires_at, t0() + secs(400));
}

#[tokio::test]
async fn test_renew_after_expiry_fails() {
    let leases = manager();
    let lease = leases.acquire("j", "a", FIVE_MINUTES, t0()).await.unwrap();
    let err = leases.renew(lease.token, FIVE_MINUTES, t0() + secs(300)).await.unwrap_err();
    assert!(matches!(err, StoreError::LeaseExpired(token) if token == lease.token));
}

#[tokio::test]
async fn test_renew_mirrors_run_expiry() {
    let store = Arc::new(MemoryJobStore::new());
    let leases = LeaseManager::new(store.clone());
    let lease = leases.acquire("j", "a", FIVE_MINUTES, t0()).await.unwrap();
    let mut run = JobRun::new("j", t0());
    run.lease(&lease);
    store.record_run(&run).await.unwrap();

    leases.renew(lease.token, FIVE_MINUTES, t0() + secs(60)).await.unwrap();
    let run = store.get_run("j", t0()).await.unwrap().unwrap();
    assert_eq!(run.lease_expires_at, Some(t0() + secs(360)));
}

#[tokio::test]
async fn test_release_frees_the_job() {
    let leases = manager();
    let lease = leases.acquire("j", "a", FIVE_MINUTES, t0()).await.unwrap();
    leases.release(lease.token, t0() + secs(10)).await.unwrap();
    assert!(leases.current("j", t0() + secs(10)).await.unwrap().is_none());
    leases.acquire("j", "b", FIVE_MINUTES, t0() + secs(11)).await.unwrap();
}

#[tokio::test]
async fn test_release_after_expiry_reports_expired() {
    let leases = manager();
    let lease = leases.acquire("j", "a", FIVE_MINUTES, t0()).await.unwrap();
    let err = leases.release(lease.token, t0() + secs(300)).await.unwrap_err();
    assert!(matches!(err, StoreError::LeaseExpired(_)));
}

#[tokio::test]
async fn test_reclaim_only_expired() {
    let leases = manager();
    let lease = leases.acquire("j", "a", FIVE_MINUTES, t0()).await.unwrap();
    assert!(leases.reclaim(lease.token, t0() + secs(299)).await.unwrap().is_none());

    let reclaimed = leases.reclaim(lease.token, t0() + secs(300)).await.unwrap().unwrap();
    assert_eq!(reclaimed.token, lease.token);
    assert!(leases.reclaim(lease.token, t0() + secs(300)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_acquire_has_one_winner() {
    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::in_memory().await.unwrap());
    let leases = LeaseManager::new(store);

    let mut handles = Vec::new();
    for i in 0..16 {
        let leases = leases.clone();
        handles.push(tokio::spawn(async move {
            leases
                .acquire("ProcessJob", &format!("dispatcher-{}", i), FIVE_MINUTES, t0())
                .await
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(StoreError::AlreadyLeased(_)) => losers += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(losers, 15);
}

#[tokio::test]
async fn test_oversized_duration_rejected() {
    let leases = manager();
    let err = leases
        .acquire("j", "a", Duration::from_secs(u64::MAX), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidLease(_)));
}
