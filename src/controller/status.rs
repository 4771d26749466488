//! Status management utilities.
//!
//! Pure helpers that turn a `ceph status` health snapshot into the CephCluster
//! status record, build the status patch, and maintain the conditions list.

use jiff::Timestamp;
use serde_json::{Map, Value, json};

use crate::client::{HEALTH_ERR, HealthStatus};
use crate::crd::{CephHealthMessage, CephStatus, Condition, ConditionType};

/// Key of the synthetic check recorded when `ceph status` fails.
pub const ERROR_CHECK: &str = "error";
/// Severity of the synthetic check recorded when `ceph status` fails.
pub const ERROR_SEVERITY: &str = "Urgent";

/// Format a timestamp as RFC 3339 in UTC with second precision.
///
/// All status timestamps use this format so `lastChecked` and `lastChanged`
/// can be compared as strings.
pub fn format_time(ts: Timestamp) -> String {
    ts.strftime("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Fold a fresh health snapshot into the previously recorded status.
///
/// `details` always mirrors the snapshot. `previous_health` and
/// `last_changed` only move when the health label differs from a previously
/// recorded one; otherwise they are carried forward unchanged.
pub fn to_custom_resource_status(
    current: Option<&CephStatus>,
    snapshot: &HealthStatus,
    now: Timestamp,
) -> CephStatus {
    let mut status = CephStatus {
        health: snapshot.status.clone(),
        details: snapshot
            .checks
            .iter()
            .map(|(code, check)| {
                (
                    code.clone(),
                    CephHealthMessage {
                        severity: check.severity.clone(),
                        message: check.summary.message.clone(),
                    },
                )
            })
            .collect(),
        last_checked: format_time(now),
        last_changed: String::new(),
        previous_health: String::new(),
    };

    // A record without a health label carries no observation to transition from
    if let Some(current) = current.filter(|c| !c.health.is_empty()) {
        status.previous_health = current.previous_health.clone();
        status.last_changed = current.last_changed.clone();
        if current.health != status.health {
            status.previous_health = current.health.clone();
            status.last_changed = status.last_checked.clone();
        }
    }

    status
}

/// Health snapshot recorded when `ceph status` could not be fetched.
pub fn status_on_error(message: &str) -> HealthStatus {
    HealthStatus::new(HEALTH_ERR).with_check(ERROR_CHECK, ERROR_SEVERITY, message)
}

/// Build the JSON merge patch writing `status.ceph` and `status.phase`.
///
/// Merge patches merge maps key by key, so checks present in `current` but
/// absent from `next` are explicitly nulled to keep `details` an exact copy
/// of the latest snapshot. No other status field is touched.
pub fn ceph_status_patch(
    current: Option<&CephStatus>,
    next: &CephStatus,
    phase: ConditionType,
) -> Value {
    let mut details = Map::new();
    if let Some(current) = current {
        for stale in current.details.keys().filter(|k| !next.details.contains_key(*k)) {
            details.insert(stale.clone(), Value::Null);
        }
    }
    for (code, check) in &next.details {
        details.insert(
            code.clone(),
            json!({"severity": check.severity, "message": check.message}),
        );
    }

    let optional = |s: &str| {
        if s.is_empty() {
            Value::Null
        } else {
            Value::String(s.to_string())
        }
    };

    json!({
        "status": {
            "phase": phase,
            "ceph": {
                "health": next.health,
                "details": Value::Object(details),
                "lastChecked": next.last_checked,
                "lastChanged": optional(&next.last_changed),
                "previousHealth": optional(&next.previous_health),
            }
        }
    })
}

/// Condition types that describe the outcome of the last status check.
/// Only one of them is "True" at a time.
const OUTCOME_CONDITIONS: [ConditionType; 3] = [
    ConditionType::Ready,
    ConditionType::Connected,
    ConditionType::Failure,
];

/// Builder for managing conditions list
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
}

impl ConditionBuilder {
    /// Start from the conditions currently on the resource
    pub fn from_existing(conditions: &[Condition]) -> Self {
        Self {
            conditions: conditions.to_vec(),
        }
    }

    /// Add or update a condition.
    ///
    /// The transition time is kept when a condition of the same type keeps
    /// its status; the heartbeat always moves.
    pub fn set(&mut self, mut condition: Condition) -> &mut Self {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
        self
    }

    /// Set an outcome condition to "True" and every other outcome condition to "False".
    pub fn set_outcome(&mut self, condition: Condition) -> &mut Self {
        let now = condition.last_heartbeat_time.clone();
        let active = condition.r#type.clone();
        self.set(condition);
        for other in self
            .conditions
            .iter_mut()
            .filter(|c| c.r#type != active && OUTCOME_CONDITIONS.contains(&c.r#type))
        {
            if other.is_true() {
                other.status = "False".to_string();
                other.last_transition_time = now.clone();
            }
            other.last_heartbeat_time = now.clone();
        }
        self
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: ConditionType) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(Condition::is_true)
}
