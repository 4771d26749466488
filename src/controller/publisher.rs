//! Publishing of Ceph health onto the CephCluster status.
//!
//! The publisher reads the CephCluster fresh on every check, folds the new
//! snapshot into the recorded health, writes `status.ceph` and
//! `status.phase`, then upserts the matching condition. A CephCluster that no
//! longer exists is not an error: the checker races with deletion.

use jiff::Timestamp;
use kube::{
    Api, Client,
    api::{Patch, PatchParams},
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::client::{CephVersion, HealthStatus};
use crate::controller::condition::ClusterCondition;
use crate::controller::error::Error;
use crate::controller::status::{
    ConditionBuilder, ceph_status_patch, format_time, to_custom_resource_status,
};
use crate::crd::{CephCluster, CephStatus, Condition};

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "ceph-status-operator";

/// Storage of CephCluster objects as seen by the status checker.
pub trait ClusterStatusApi {
    /// Read a CephCluster. `Ok(None)` means it does not exist.
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<CephCluster>, Error>> + Send;

    /// Apply a JSON merge patch to the status subresource.
    fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> impl std::future::Future<Output = Result<(), Error>> + Send;

    /// Publish an outcome condition. Failures are handled (logged) by the implementation.
    fn publish_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: Condition,
    ) -> impl std::future::Future<Output = ()> + Send;
}

/// `ClusterStatusApi` backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterStatus {
    client: Client,
}

impl KubeClusterStatus {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<CephCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn try_publish_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: Condition,
    ) -> Result<(), Error> {
        let api = self.api(namespace);
        let Some(cluster) = api.get_opt(name).await? else {
            return Ok(());
        };
        let existing = cluster
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        let mut builder = ConditionBuilder::from_existing(existing);
        builder.set_outcome(condition);
        let patch = json!({
            "status": {
                "conditions": builder.build()
            }
        });
        match api
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(Error::from)
        {
            Err(e) if e.is_not_found() => Ok(()),
            result => result.map(|_| ()),
        }
    }
}

impl ClusterStatusApi for KubeClusterStatus {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<CephCluster>, Error> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<(), Error> {
        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await?;
        Ok(())
    }

    async fn publish_condition(&self, namespace: &str, name: &str, condition: Condition) {
        let condition_type = condition.r#type.clone();
        if let Err(e) = self.try_publish_condition(namespace, name, condition).await {
            warn!(
                namespace = %namespace,
                name = %name,
                condition = %condition_type,
                error = %e,
                "Failed to publish condition"
            );
        }
    }
}

/// Result of publishing one check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Status and condition were written.
    Updated(CephStatus),
    /// The CephCluster no longer exists; nothing was written.
    NotFound,
}

/// Record a health snapshot and its condition on the CephCluster.
///
/// The status write happens before the condition is published so both carry
/// the values of the same check.
pub async fn update_ceph_status<S>(
    store: &S,
    namespace: &str,
    name: &str,
    snapshot: &HealthStatus,
    condition: ClusterCondition,
    now: Timestamp,
) -> Result<PublishOutcome, Error>
where
    S: ClusterStatusApi,
{
    let Some(cluster) = store.get(namespace, name).await? else {
        debug!(
            namespace = %namespace,
            name = %name,
            "CephCluster resource not found. Ignoring since object must be deleted."
        );
        return Ok(PublishOutcome::NotFound);
    };

    let current = cluster.status.as_ref().and_then(|s| s.ceph.as_ref());
    let next = to_custom_resource_status(current, snapshot, now);
    let patch = ceph_status_patch(current, &next, condition.condition_type());
    match store.patch_status(namespace, name, &patch).await {
        Err(e) if e.is_not_found() => {
            debug!(
                namespace = %namespace,
                name = %name,
                "CephCluster deleted before its status was written"
            );
            return Ok(PublishOutcome::NotFound);
        }
        result => result?,
    }

    store
        .publish_condition(
            namespace,
            name,
            Condition::new(
                condition.condition_type(),
                true,
                condition.reason(),
                condition.message(),
                &format_time(now),
            ),
        )
        .await;

    debug!(
        namespace = %namespace,
        name = %name,
        health = %next.health,
        condition = %condition,
        "ceph cluster status and condition updated"
    );
    Ok(PublishOutcome::Updated(next))
}

/// Record the detected Ceph version in `status.version`.
///
/// Only the version field is written so concurrent health updates are kept.
/// Returns `false` when the CephCluster no longer exists.
pub async fn update_cluster_version<S>(
    store: &S,
    namespace: &str,
    name: &str,
    image: &str,
    version: &CephVersion,
) -> Result<bool, Error>
where
    S: ClusterStatusApi,
{
    if store.get(namespace, name).await?.is_none() {
        debug!(
            namespace = %namespace,
            name = %name,
            "CephCluster resource not found. Ignoring since object must be deleted."
        );
        return Ok(false);
    }

    let patch = json!({
        "status": {
            "version": {
                "image": image,
                "version": version.label(),
            }
        }
    });
    match store.patch_status(namespace, name, &patch).await {
        Err(e) if e.is_not_found() => return Ok(false),
        result => result?,
    }
    debug!(namespace = %namespace, name = %name, version = %version, "Recorded ceph version");
    Ok(true)
}
