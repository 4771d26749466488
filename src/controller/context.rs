//! Shared context for the controller.
//!
//! Holds the Kubernetes client, Ceph connection settings and health state,
//! and knows how to build the status checker for one CephCluster.

use std::sync::Arc;

use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::CephClient;
use crate::controller::checker::StatusChecker;
use crate::controller::config::{CephConnectionSettings, PollerConfig, process_env};
use crate::controller::publisher::{KubeClusterStatus, update_cluster_version};
use crate::crd::CephCluster;
use crate::health::HealthState;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// How to reach the Ceph clusters
    pub connection: CephConnectionSettings,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a new context with connection settings from the process environment
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            connection: CephConnectionSettings::from_env(process_env),
            health_state,
        }
    }

    /// Ceph CLI client for a cluster
    pub fn ceph_client(&self, namespace: &str, name: &str) -> CephClient {
        CephClient::new(self.connection.cluster_info(namespace, name))
            .with_timeout(self.connection.command_timeout)
    }

    /// Build the status checker for a cluster.
    ///
    /// Settings are resolved here, once; later spec edits take effect when
    /// the checker is restarted.
    pub fn status_checker(
        &self,
        cluster: &CephCluster,
    ) -> StatusChecker<CephClient, KubeClusterStatus> {
        let namespace = cluster.namespace().unwrap_or_default();
        let name = cluster.name_any();
        StatusChecker::new(
            self.ceph_client(&namespace, &name),
            KubeClusterStatus::new(self.client.clone()),
            namespace,
            name,
            PollerConfig::resolve(&cluster.spec, process_env),
        )
        .with_health_state(self.health_state.clone())
    }

    /// Monitor a cluster until `cancel` fires.
    ///
    /// Records the running Ceph version once, then runs the status checker.
    pub async fn monitor(self: Arc<Self>, cluster: CephCluster, cancel: CancellationToken) {
        let namespace = cluster.namespace().unwrap_or_default();
        let name = cluster.name_any();

        self.record_version(&cluster, &namespace, &name).await;

        let checker = self.status_checker(&cluster);
        checker.run(cancel).await;
    }

    async fn record_version(&self, cluster: &CephCluster, namespace: &str, name: &str) {
        let ceph = self.ceph_client(namespace, name);
        let version = match ceph.version().await {
            Ok(version) => version,
            Err(e) => {
                warn!(namespace = %namespace, name = %name, error = %e, "Failed to detect ceph version");
                return;
            }
        };
        debug!(namespace = %namespace, name = %name, version = %version, "Detected ceph version");

        let store = KubeClusterStatus::new(self.client.clone());
        if let Err(e) =
            update_cluster_version(&store, namespace, name, &cluster.spec.ceph_version.image, &version).await
        {
            warn!(namespace = %namespace, name = %name, error = %e, "Failed to record ceph version");
        }
    }
}
