//! Cluster condition derived from the outcome of a status check.
//!
//! The condition is recomputed from scratch on every check and never compared
//! against the previously published one.

use crate::crd::ConditionType;

/// Outcome of fetching `ceph status` in one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    Failure,
}

/// Condition published for a check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterCondition {
    /// `ceph status` failed.
    Failure { external: bool },
    /// `ceph status` succeeded on a managed cluster.
    Ready,
    /// `ceph status` succeeded on an external cluster.
    Connected,
}

impl ClusterCondition {
    /// Derive the condition for a check outcome.
    pub fn classify(outcome: CheckOutcome, is_external: bool) -> Self {
        match (outcome, is_external) {
            (CheckOutcome::Failure, external) => ClusterCondition::Failure { external },
            (CheckOutcome::Success, false) => ClusterCondition::Ready,
            (CheckOutcome::Success, true) => ClusterCondition::Connected,
        }
    }

    /// Condition type written to the resource (also used as its phase).
    pub fn condition_type(self) -> ConditionType {
        match self {
            ClusterCondition::Failure { .. } => ConditionType::Failure,
            ClusterCondition::Ready => ConditionType::Ready,
            ClusterCondition::Connected => ConditionType::Connected,
        }
    }

    /// Machine-readable reason.
    pub fn reason(self) -> &'static str {
        match self {
            ClusterCondition::Failure { .. } => "ClusterFailure",
            ClusterCondition::Ready => "ClusterCreated",
            ClusterCondition::Connected => "ClusterConnected",
        }
    }

    /// Human-readable message.
    pub fn message(self) -> &'static str {
        match self {
            ClusterCondition::Failure { external: false } => "Failed to configure ceph cluster",
            ClusterCondition::Failure { external: true } => {
                "Failed to configure external ceph cluster"
            }
            ClusterCondition::Ready => "Cluster created successfully",
            ClusterCondition::Connected => "Cluster connected successfully",
        }
    }
}

impl std::fmt::Display for ClusterCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}: {})", self.condition_type(), self.reason(), self.message())
    }
}
