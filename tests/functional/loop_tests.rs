//! Loop tests: scheduling, cancellation and resilience of `StatusChecker::run`.

use std::time::Duration;

use ceph_status_operator::client::{HEALTH_OK, HealthStatus};
use ceph_status_operator::controller::checker::StatusChecker;
use ceph_status_operator::controller::config::PollerConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::*;

const NS: &str = "rook-ceph";
const NAME: &str = "my-cluster";
const INTERVAL: Duration = Duration::from_secs(10);

fn spawn_checker(ceph: &FakeCeph, store: &FakeStore) -> (CancellationToken, JoinHandle<()>) {
    let config = PollerConfig {
        interval: INTERVAL,
        is_external: false,
    };
    let checker = StatusChecker::new(ceph.clone(), store.clone(), NS, NAME, config)
        .with_clock(TokioClock::starting_at("2024-05-01T10:00:00Z"));
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { checker.run(token).await });
    (cancel, handle)
}

#[tokio::test(start_paused = true)]
async fn test_checks_immediately_then_every_interval() {
    let ceph = FakeCeph::healthy(HealthStatus::new(HEALTH_OK));
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let (cancel, handle) = spawn_checker(&ceph, &store);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ceph.status_calls(), 1);

    // t = 25s: checks ran at 0s, 10s and 20s
    tokio::time::sleep(Duration::from_secs(24)).await;
    assert_eq!(ceph.status_calls(), 3);
    assert_eq!(store.status_writes(), 3);

    let ceph_status = store.cluster().unwrap().status.unwrap().ceph.unwrap();
    assert_eq!(ceph_status.last_checked, "2024-05-01T10:00:20Z");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_the_loop() {
    let ceph = FakeCeph::healthy(HealthStatus::new(HEALTH_OK));
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let (cancel, handle) = spawn_checker(&ceph, &store);

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();
    handle.await.unwrap();
    let calls = ceph.status_calls();

    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(ceph.status_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_still_checks_once() {
    let ceph = FakeCeph::healthy(HealthStatus::new(HEALTH_OK));
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let config = PollerConfig {
        interval: INTERVAL,
        is_external: false,
    };
    let checker = StatusChecker::new(ceph.clone(), store.clone(), NS, NAME, config);
    let cancel = CancellationToken::new();
    cancel.cancel();

    checker.run(cancel).await;
    assert_eq!(ceph.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_does_not_stop_the_loop() {
    let ceph = FakeCeph::healthy(HealthStatus::new(HEALTH_OK));
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    store.fail_writes(2);
    let (cancel, handle) = spawn_checker(&ceph, &store);

    // t = 25s: the first two writes failed, the third succeeded
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(ceph.status_calls(), 3);
    assert_eq!(store.status_writes(), 1);
    let ceph_status = store.cluster().unwrap().status.unwrap().ceph.unwrap();
    assert_eq!(ceph_status.health, HEALTH_OK);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_deleted_cluster_keeps_polling_until_cancelled() {
    let ceph = FakeCeph::healthy(HealthStatus::new(HEALTH_OK));
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let (cancel, handle) = spawn_checker(&ceph, &store);

    tokio::time::sleep(Duration::from_secs(5)).await;
    store.delete();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(ceph.status_calls(), 3);
    assert_eq!(store.status_writes(), 1);
    assert!(!handle.is_finished());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failures_keep_the_loop_running() {
    let ceph = FakeCeph::unreachable("error calling conf_read_file");
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let (cancel, handle) = spawn_checker(&ceph, &store);

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(ceph.status_calls(), 4);
    assert_eq!(store.status_writes(), 4);
    assert!(ceph.config_writes().is_empty());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_check_delays_the_next_one() {
    // Each check takes longer than the interval
    let ceph = FakeCeph::healthy(HealthStatus::new(HEALTH_OK)).slow(Duration::from_secs(15));
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let (cancel, handle) = spawn_checker(&ceph, &store);

    // t = 30s: first check ran 0s..15s, the second started at 25s
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ceph.status_calls(), 2);
    assert_eq!(store.status_writes(), 1);
    let ceph_status = store.cluster().unwrap().status.unwrap().ceph.unwrap();
    assert_eq!(ceph_status.last_checked, "2024-05-01T10:00:15Z");

    // t = 41s: the second check finished at 40s
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(ceph.status_calls(), 2);
    assert_eq!(store.status_writes(), 2);
    let ceph_status = store.cluster().unwrap().status.unwrap().ceph.unwrap();
    assert_eq!(ceph_status.last_checked, "2024-05-01T10:00:40Z");
    assert_eq!(ceph.max_in_flight(), 1);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_check_lets_it_finish() {
    let ceph = FakeCeph::healthy(HealthStatus::new(HEALTH_OK)).slow(Duration::from_secs(15));
    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let started = tokio::time::Instant::now();
    let (cancel, handle) = spawn_checker(&ceph, &store);

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();
    assert_eq!(store.status_writes(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!handle.is_finished());

    handle.await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert_eq!(ceph.status_calls(), 1);
    assert_eq!(store.status_writes(), 1);
    let ceph_status = store.cluster().unwrap().status.unwrap().ceph.unwrap();
    assert_eq!(ceph_status.last_checked, "2024-05-01T10:00:15Z");
}
