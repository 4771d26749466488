//! CephCluster Custom Resource Definition.
//!
//! Only the parts of the CephCluster resource that the status checker reads
//! or writes are modelled here. Unknown spec fields are preserved by the API
//! server because the operator never writes the spec.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CephCluster describes a Ceph storage cluster managed (or connected to) by the operator.
///
/// Example:
/// ```yaml
/// apiVersion: ceph.rook.io/v1
/// kind: CephCluster
/// metadata:
///   name: rook-ceph
///   namespace: rook-ceph
/// spec:
///   cephVersion:
///     image: quay.io/ceph/ceph:v18.2.4
///   dataDirHostPath: /var/lib/rook
///   healthCheck:
///     daemonHealth:
///       status:
///         interval: 30s
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephCluster",
    plural = "cephclusters",
    shortname = "ceph",
    status = "ClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Health", "type":"string", "jsonPath":".status.ceph.health"}"#,
    printcolumn = r#"{"name":"External", "type":"boolean", "jsonPath":".spec.external.enable"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Ceph container image in use by the cluster daemons.
    #[serde(default)]
    pub ceph_version: CephVersionSpec,

    /// Host path holding cluster configuration (default: /var/lib/rook).
    #[serde(default = "default_data_dir_host_path")]
    pub data_dir_host_path: String,

    /// Connection settings for a cluster that is not managed by this operator.
    #[serde(default)]
    pub external: ExternalSpec,

    /// Health check tuning.
    #[serde(default)]
    pub health_check: CephClusterHealthCheckSpec,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            ceph_version: CephVersionSpec::default(),
            data_dir_host_path: default_data_dir_host_path(),
            external: ExternalSpec::default(),
            health_check: CephClusterHealthCheckSpec::default(),
        }
    }
}

fn default_data_dir_host_path() -> String {
    "/var/lib/rook".to_string()
}

/// Ceph image specification.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephVersionSpec {
    /// Container image, e.g. quay.io/ceph/ceph:v18.2.4.
    #[serde(default)]
    pub image: String,
}

/// External cluster settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSpec {
    /// The Ceph cluster runs outside of this Kubernetes cluster.
    #[serde(default)]
    pub enable: bool,
}

/// Health check settings for the cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephClusterHealthCheckSpec {
    #[serde(default)]
    pub daemon_health: DaemonHealthSpec,
}

/// Per-daemon health check settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DaemonHealthSpec {
    /// Settings for the cluster-wide `ceph status` check.
    #[serde(default)]
    pub status: HealthCheckSpec,
}

/// Settings of a single periodic health check.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    /// Interval between checks as a duration string (e.g. "60s", "1m30s").
    /// Empty means "use the operator default".
    #[serde(default)]
    pub interval: String,
}

/// Status of a CephCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Coarse phase of the cluster, mirrors the last published condition.
    #[serde(default)]
    pub phase: ConditionType,

    /// Human-readable message for the current phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Latest Ceph health as reported by `ceph status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceph: Option<CephStatus>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Ceph version running in the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<ClusterVersion>,
}

/// Health record projected from `ceph status`.
///
/// `previous_health` and `last_changed` stay empty until the health label
/// changes for the first time. Timestamps are RFC 3339 in UTC with second
/// precision so they can be compared as strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephStatus {
    /// Current health label, e.g. HEALTH_OK.
    #[serde(default)]
    pub health: String,

    /// Active health checks keyed by check code.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, CephHealthMessage>,

    /// Time of the most recent check.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_checked: String,

    /// Time of the most recent health label change.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_changed: String,

    /// Health label observed before the most recent change.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_health: String,
}

/// A single active health check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephHealthMessage {
    pub severity: String,
    pub message: String,
}

/// Ceph image and detected version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersion {
    #[serde(default)]
    pub image: String,
    /// Version label, e.g. "18.2.4-0".
    #[serde(default)]
    pub version: String,
}

/// Condition types reported on a CephCluster.
///
/// Other controllers write phases and condition types of their own to the
/// same resource (e.g. `Connecting`, `DeletionIsBlocked`). Those decode into
/// `Other` and serialize back unchanged.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionType {
    /// The operator is still bringing the cluster up.
    #[default]
    Progressing,
    /// The managed cluster is up and `ceph status` answers.
    Ready,
    /// The external cluster answers `ceph status`.
    Connected,
    /// `ceph status` could not be obtained.
    Failure,
    /// Cluster configuration is being updated.
    Updating,
    /// Cluster is being deleted.
    Deleting,
    /// A value this operator does not act on.
    Other(String),
}

impl ConditionType {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionType::Progressing => "Progressing",
            ConditionType::Ready => "Ready",
            ConditionType::Connected => "Connected",
            ConditionType::Failure => "Failure",
            ConditionType::Updating => "Updating",
            ConditionType::Deleting => "Deleting",
            ConditionType::Other(other) => other,
        }
    }
}

impl From<String> for ConditionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Progressing" => ConditionType::Progressing,
            "Ready" => ConditionType::Ready,
            "Connected" => ConditionType::Connected,
            "Failure" => ConditionType::Failure,
            "Updating" => ConditionType::Updating,
            "Deleting" => ConditionType::Deleting,
            _ => ConditionType::Other(value),
        }
    }
}

impl From<ConditionType> for String {
    fn from(value: ConditionType) -> Self {
        match value {
            ConditionType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl JsonSchema for ConditionType {
    fn schema_name() -> String {
        "ConditionType".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(generator)
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: ConditionType,
    /// Status of the condition ("True", "False", "Unknown").
    #[serde(default)]
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    #[serde(default)]
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    #[serde(default)]
    pub message: String,
    /// Last time the condition was published.
    #[serde(default)]
    pub last_heartbeat_time: String,
    /// Last time the condition transitioned from one status to another.
    #[serde(default)]
    pub last_transition_time: String,
}

impl Condition {
    /// Create a new condition stamped with `now`.
    pub fn new(
        condition_type: ConditionType,
        status: bool,
        reason: &str,
        message: &str,
        now: &str,
    ) -> Self {
        Self {
            r#type: condition_type,
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_heartbeat_time: now.to_string(),
            last_transition_time: now.to_string(),
        }
    }

    /// Whether the condition status is "True".
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}
