//! ceph-status-operator library crate
//!
//! Watches CephCluster resources and runs one status checker per cluster,
//! projecting `ceph status` onto the resource's status and conditions.

pub mod client;
pub mod controller;
pub mod crd;
pub mod health;

pub use health::HealthState;

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::{Config as WatcherConfig, Event};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use controller::context::Context;
use controller::supervisor::{ClusterKey, PollerRegistry};
use crd::CephCluster;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration.
///
/// `any_semantic()`: More reliable resource discovery in test environments
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

fn cluster_key(cluster: &CephCluster) -> ClusterKey {
    ClusterKey::new(cluster.namespace().unwrap_or_default(), cluster.name_any())
}

/// Run the operator controller until `shutdown` is cancelled.
///
/// When `namespace` is `Some(ns)`, only clusters in that namespace are
/// monitored. Every CephCluster gets one status checker, started when the
/// cluster is first seen and cancelled when it is deleted. All checkers are
/// stopped and awaited before this returns.
pub async fn run_controller(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
    shutdown: CancellationToken,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    info!(
        "Starting controller for CephCluster resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone(), health_state.clone()));
    let mut registry = PollerRegistry::new(shutdown.clone(), health_state.clone());

    let clusters: Api<CephCluster> = scoped_api(client, namespace);
    let mut events = watcher(clusters, default_watcher_config())
        .default_backoff()
        .boxed();

    // Mark as ready once we start watching
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    // Clusters seen during a relist; checkers for anything else are stopped on InitDone
    let mut relisted: Option<HashSet<ClusterKey>> = None;

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };

        let Some(event) = event else {
            error!("CephCluster watch stream ended unexpectedly");
            break;
        };

        match event {
            Ok(Event::Init) => {
                debug!("Relisting CephCluster resources");
                relisted = Some(HashSet::new());
            }
            Ok(Event::InitApply(cluster)) => {
                if let Some(seen) = relisted.as_mut() {
                    seen.insert(cluster_key(&cluster));
                }
                start_checker(&ctx, &mut registry, cluster);
            }
            Ok(Event::InitDone) => {
                if let Some(seen) = relisted.take() {
                    let stopped = registry.retain(&seen);
                    debug!(clusters = seen.len(), stopped, "Relist complete");
                }
            }
            Ok(Event::Apply(cluster)) => start_checker(&ctx, &mut registry, cluster),
            Ok(Event::Delete(cluster)) => {
                let key = cluster_key(&cluster);
                if registry.stop(&key) {
                    info!(cluster = %key, "CephCluster deleted, stopped status checker");
                }
            }
            Err(e) => {
                warn!(error = %e, "CephCluster watch error");
            }
        }
    }

    if let Some(ref state) = health_state {
        state.set_ready(false).await;
    }
    registry.shutdown().await;
    info!("Controller stopped");
}

fn start_checker(ctx: &Arc<Context>, registry: &mut PollerRegistry, cluster: CephCluster) {
    let key = cluster_key(&cluster);
    if cluster.meta().deletion_timestamp.is_some() {
        if registry.stop(&key) {
            info!(cluster = %key, "CephCluster is being deleted, stopped status checker");
        }
        return;
    }

    let uid = cluster.uid();
    let ctx = ctx.clone();
    if registry.ensure(key.clone(), uid, move |cancel| ctx.monitor(cluster, cancel)) {
        info!(cluster = %key, "Started monitoring ceph status");
    }
}
