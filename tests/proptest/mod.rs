// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for ceph-status-operator.
//!
//! Uses proptest to generate random health histories and verify the
//! invariants of the health record.

use std::collections::BTreeSet;

use jiff::{SignedDuration, Timestamp};
use proptest::prelude::*;

use ceph_status_operator::client::{HEALTH_ERR, HEALTH_OK, HEALTH_WARN, HealthStatus};
use ceph_status_operator::controller::condition::{CheckOutcome, ClusterCondition};
use ceph_status_operator::controller::status::{
    ceph_status_patch, format_time, to_custom_resource_status,
};
use ceph_status_operator::crd::{CephStatus, ConditionType};

/// Strategy for generating health labels.
fn any_health() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(HEALTH_OK.to_string()),
        Just(HEALTH_WARN.to_string()),
        Just(HEALTH_ERR.to_string()),
    ]
}

/// Strategy for generating health snapshots with a few checks.
fn any_snapshot() -> impl Strategy<Value = HealthStatus> {
    (
        any_health(),
        prop::collection::btree_map("[A-Z_]{3,20}", "[a-z0-9 ]{0,30}", 0..4),
    )
        .prop_map(|(status, checks)| {
            checks
                .into_iter()
                .fold(HealthStatus::new(status), |health, (code, message)| {
                    health.with_check(code, HEALTH_WARN, message)
                })
        })
}

/// Strategy for generating check outcomes.
fn any_outcome() -> impl Strategy<Value = CheckOutcome> {
    prop_oneof![Just(CheckOutcome::Success), Just(CheckOutcome::Failure)]
}

fn start() -> Timestamp {
    "2024-01-01T00:00:00Z".parse().unwrap()
}

/// Fold a history of snapshots taken `step_secs` apart.
fn fold_history(history: &[HealthStatus], step_secs: i64) -> Vec<CephStatus> {
    let mut records: Vec<CephStatus> = Vec::new();
    for (i, snapshot) in history.iter().enumerate() {
        let now = start()
            .checked_add(SignedDuration::from_secs(step_secs * i as i64))
            .unwrap();
        let next = to_custom_resource_status(records.last(), snapshot, now);
        records.push(next);
    }
    records
}

proptest! {
    /// Property: details always mirror the latest snapshot.
    #[test]
    fn test_details_mirror_snapshot(
        history in prop::collection::vec(any_snapshot(), 1..8)
    ) {
        let records = fold_history(&history, 60);
        for (record, snapshot) in records.iter().zip(&history) {
            prop_assert_eq!(&record.health, &snapshot.status);
            let record_keys: BTreeSet<&String> = record.details.keys().collect();
            let snapshot_keys: BTreeSet<&String> = snapshot.checks.keys().collect();
            prop_assert_eq!(record_keys, snapshot_keys);
        }
    }

    /// Property: history moves exactly when the health label changes.
    #[test]
    fn test_history_moves_only_on_change(
        history in prop::collection::vec(any_snapshot(), 2..10)
    ) {
        let records = fold_history(&history, 60);
        for pair in records.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.health == next.health {
                prop_assert_eq!(&next.previous_health, &prev.previous_health);
                prop_assert_eq!(&next.last_changed, &prev.last_changed);
            } else {
                prop_assert_eq!(&next.previous_health, &prev.health);
                prop_assert_eq!(&next.last_changed, &next.last_checked);
            }
        }
    }

    /// Property: a recorded change always has both its time and previous label,
    /// and never happens after the last check.
    #[test]
    fn test_last_changed_not_after_last_checked(
        history in prop::collection::vec(any_snapshot(), 1..10),
        step in 1i64..3600
    ) {
        let records = fold_history(&history, step);
        for record in &records {
            prop_assert_eq!(record.last_changed.is_empty(), record.previous_health.is_empty());
            if !record.last_changed.is_empty() {
                prop_assert!(record.last_changed <= record.last_checked);
                prop_assert_ne!(&record.previous_health, &record.health);
            }
        }
        let last = records.last().unwrap();
        let expected = start()
            .checked_add(SignedDuration::from_secs(step * (history.len() as i64 - 1)))
            .unwrap();
        prop_assert_eq!(&last.last_checked, &format_time(expected));
    }

    /// Property: the patch nulls exactly the checks that disappeared.
    #[test]
    fn test_patch_nulls_removed_checks(
        before in any_snapshot(),
        after in any_snapshot()
    ) {
        let now = start();
        let current = to_custom_resource_status(None, &before, now);
        let next = to_custom_resource_status(Some(&current), &after, now);
        let patch = ceph_status_patch(Some(&current), &next, ConditionType::Ready);
        let details = patch["status"]["ceph"]["details"].as_object().unwrap();

        for code in before.checks.keys() {
            if after.checks.contains_key(code) {
                prop_assert!(details[code].is_object());
            } else {
                prop_assert!(details[code].is_null());
            }
        }
        for code in after.checks.keys() {
            prop_assert!(details[code].is_object());
        }
    }

    /// Property: classification is total and only failures map to Failure.
    #[test]
    fn test_classification(outcome in any_outcome(), external in any::<bool>()) {
        let condition = ClusterCondition::classify(outcome, external);
        let is_failure = condition.condition_type() == ConditionType::Failure;
        prop_assert_eq!(is_failure, outcome == CheckOutcome::Failure);
        if outcome == CheckOutcome::Success {
            let expected = if external { ConditionType::Connected } else { ConditionType::Ready };
            prop_assert_eq!(condition.condition_type(), expected);
        }
        prop_assert!(!condition.message().is_empty());
    }
}
