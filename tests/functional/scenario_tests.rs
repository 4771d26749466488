//! Multi-step scenarios across several checks.

use std::time::Duration;

use ceph_status_operator::client::{HEALTH_ERR, HEALTH_OK, HEALTH_WARN, HealthStatus};
use ceph_status_operator::controller::checker::StatusChecker;
use ceph_status_operator::controller::config::{PollerConfig, STATUS_CHECK_INTERVAL_ENV};
use ceph_status_operator::crd::{CephStatus, ConditionType};

use crate::common::*;

const NS: &str = "rook-ceph";
const NAME: &str = "my-cluster";

fn ceph_status(store: &FakeStore) -> CephStatus {
    store.cluster().unwrap().status.unwrap().ceph.unwrap()
}

#[tokio::test]
async fn test_health_transition_history() {
    let ceph = FakeCeph::new();
    ceph.push(CephResponse::Health(HealthStatus::new(HEALTH_OK)));
    ceph.push(CephResponse::Health(
        HealthStatus::new(HEALTH_WARN).with_check("OSD_DOWN", HEALTH_WARN, "1 osds down"),
    ));
    ceph.push(CephResponse::Health(
        HealthStatus::new(HEALTH_WARN).with_check("OSD_DOWN", HEALTH_WARN, "2 osds down"),
    ));
    ceph.push(CephResponse::Health(HealthStatus::new(HEALTH_OK)));

    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let clock = ManualClock::at("2024-05-01T10:00:00Z");
    let checker = StatusChecker::new(ceph.clone(), store.clone(), NS, NAME, PollerConfig::default())
        .with_clock(clock.clone());

    // t0: first observation, no history yet
    checker.check_status().await;
    let s = ceph_status(&store);
    assert_eq!(s.health, HEALTH_OK);
    assert_eq!(s.last_checked, "2024-05-01T10:00:00Z");
    assert!(s.previous_health.is_empty());
    assert!(s.last_changed.is_empty());

    // t1: OK -> WARN
    clock.set("2024-05-01T10:01:00Z");
    checker.check_status().await;
    let s = ceph_status(&store);
    assert_eq!(s.health, HEALTH_WARN);
    assert_eq!(s.previous_health, HEALTH_OK);
    assert_eq!(s.last_changed, "2024-05-01T10:01:00Z");
    assert_eq!(s.details["OSD_DOWN"].message, "1 osds down");

    // t2: still WARN, details change but history does not
    clock.set("2024-05-01T10:02:00Z");
    checker.check_status().await;
    let s = ceph_status(&store);
    assert_eq!(s.last_checked, "2024-05-01T10:02:00Z");
    assert_eq!(s.previous_health, HEALTH_OK);
    assert_eq!(s.last_changed, "2024-05-01T10:01:00Z");
    assert_eq!(s.details["OSD_DOWN"].message, "2 osds down");

    // t3: WARN -> OK, details emptied
    clock.set("2024-05-01T10:03:00Z");
    checker.check_status().await;
    let s = ceph_status(&store);
    assert_eq!(s.health, HEALTH_OK);
    assert_eq!(s.previous_health, HEALTH_WARN);
    assert_eq!(s.last_changed, "2024-05-01T10:03:00Z");
    assert!(s.details.is_empty());
}

#[tokio::test]
async fn test_outage_and_recovery() {
    let ceph = FakeCeph::new();
    ceph.push(CephResponse::Health(HealthStatus::new(HEALTH_OK)));
    ceph.push(CephResponse::Fail("timed out".to_string()));
    ceph.push(CephResponse::Health(HealthStatus::new(HEALTH_OK)));

    let store = FakeStore::with_cluster(test_cluster(NAME, NS));
    let clock = ManualClock::at("2024-05-01T10:00:00Z");
    let checker = StatusChecker::new(ceph.clone(), store.clone(), NS, NAME, PollerConfig::default())
        .with_clock(clock.clone());

    checker.check_status().await;

    clock.set("2024-05-01T10:01:00Z");
    checker.check_status().await;
    let status = store.cluster().unwrap().status.unwrap();
    assert_eq!(status.phase, ConditionType::Failure);
    let s = status.ceph.unwrap();
    assert_eq!(s.health, HEALTH_ERR);
    assert_eq!(s.previous_health, HEALTH_OK);
    assert!(s.details.contains_key("error"));

    clock.set("2024-05-01T10:02:00Z");
    checker.check_status().await;
    let status = store.cluster().unwrap().status.unwrap();
    assert_eq!(status.phase, ConditionType::Ready);
    let s = status.ceph.unwrap();
    assert_eq!(s.health, HEALTH_OK);
    assert_eq!(s.previous_health, HEALTH_ERR);
    assert_eq!(s.last_changed, "2024-05-01T10:02:00Z");
    assert!(s.details.is_empty());

    let published: Vec<ConditionType> = store.published().iter().map(|c| c.r#type.clone()).collect();
    assert_eq!(
        published,
        vec![ConditionType::Ready, ConditionType::Failure, ConditionType::Ready]
    );
}

fn env(value: Option<&'static str>) -> impl Fn(&str) -> Option<String> {
    move |key| {
        (key == STATUS_CHECK_INTERVAL_ENV)
            .then_some(value)
            .flatten()
            .map(str::to_string)
    }
}

#[test]
fn test_interval_resolution() {
    // Environment override wins
    let cluster = CephClusterBuilder::new(NAME).interval("30s").build();
    let config = PollerConfig::resolve(&cluster.spec, env(Some("10s")));
    assert_eq!(config.interval, Duration::from_secs(10));

    // Spec value when no override
    let config = PollerConfig::resolve(&cluster.spec, env(None));
    assert_eq!(config.interval, Duration::from_secs(30));

    // Unparsable override falls through to the spec value
    let config = PollerConfig::resolve(&cluster.spec, env(Some("soon")));
    assert_eq!(config.interval, Duration::from_secs(30));

    // Nothing usable: default
    let cluster = CephClusterBuilder::new(NAME).interval("-5s").build();
    let config = PollerConfig::resolve(&cluster.spec, env(None));
    assert_eq!(config.interval, Duration::from_secs(60));

    let cluster = external_cluster(NAME, NS);
    let config = PollerConfig::resolve(&cluster.spec, env(None));
    assert!(config.is_external);
}
