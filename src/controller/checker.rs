//! Periodic Ceph status checker.
//!
//! One checker runs per CephCluster. It checks once immediately, then once
//! per interval until cancelled. A check fetches `ceph status`, publishes
//! the derived health and condition, then applies corrective settings.
//!
//! Checks never overlap: the next sleep starts only after the previous check
//! returned. Cancellation is observed between checks (and while sleeping),
//! never during one, so a `ceph` call or API write that hangs postpones
//! shutdown until it returns. Bounding those calls is the job of the Ceph
//! client timeout and the Kubernetes client.

use std::sync::Arc;
use std::time::Instant;

use jiff::Timestamp;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::{CephHealthApi, HealthStatus};
use crate::controller::condition::{CheckOutcome, ClusterCondition};
use crate::controller::config::PollerConfig;
use crate::controller::health_settings::{GlobalIdReclaimAction, configure_health_settings};
use crate::controller::publisher::{ClusterStatusApi, PublishOutcome, update_ceph_status};
use crate::controller::status::status_on_error;
use crate::health::HealthState;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// What happened during one check.
#[derive(Debug)]
pub struct CheckReport {
    /// Condition derived for the check.
    pub condition: ClusterCondition,
    /// Outcome of writing the status; `None` if the write failed.
    pub published: Option<PublishOutcome>,
    /// Corrective action taken; `None` when `ceph status` failed.
    pub reclaim: Option<GlobalIdReclaimAction>,
}

/// Status checker for one CephCluster.
pub struct StatusChecker<C, S, K = SystemClock> {
    ceph: C,
    store: S,
    clock: K,
    namespace: String,
    name: String,
    config: PollerConfig,
    health_state: Option<Arc<HealthState>>,
}

impl<C, S> StatusChecker<C, S, SystemClock>
where
    C: CephHealthApi,
    S: ClusterStatusApi,
{
    /// Create a checker using the wall clock.
    pub fn new(
        ceph: C,
        store: S,
        namespace: impl Into<String>,
        name: impl Into<String>,
        config: PollerConfig,
    ) -> Self {
        Self {
            ceph,
            store,
            clock: SystemClock,
            namespace: namespace.into(),
            name: name.into(),
            config,
            health_state: None,
        }
    }
}

impl<C, S, K> StatusChecker<C, S, K>
where
    C: CephHealthApi,
    S: ClusterStatusApi,
    K: Clock,
{
    /// Replace the clock.
    pub fn with_clock<K2: Clock>(self, clock: K2) -> StatusChecker<C, S, K2> {
        StatusChecker {
            ceph: self.ceph,
            store: self.store,
            clock,
            namespace: self.namespace,
            name: self.name,
            config: self.config,
            health_state: self.health_state,
        }
    }

    /// Record check metrics in the given health state.
    pub fn with_health_state(mut self, health_state: Option<Arc<HealthState>>) -> Self {
        self.health_state = health_state;
        self
    }

    /// Resolved checker settings.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Check periodically until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            namespace = %self.namespace,
            name = %self.name,
            interval = ?self.config.interval,
            "Starting ceph status monitoring"
        );

        // Check immediately before starting the loop
        self.check_status().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(namespace = %self.namespace, name = %self.name, "stopping monitoring of ceph status");
                    return;
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    self.check_status().await;
                }
            }
        }
    }

    /// Run one check: fetch, publish, then apply corrective settings.
    pub async fn check_status(&self) -> CheckReport {
        let started = Instant::now();
        debug!(namespace = %self.namespace, name = %self.name, "checking health of cluster");

        let (snapshot, outcome) = match self.ceph.status().await {
            Ok(report) => {
                debug!(namespace = %self.namespace, health = %report.health.status, "cluster status");
                (report.health, CheckOutcome::Success)
            }
            Err(e) => {
                error!(namespace = %self.namespace, name = %self.name, error = %e, "failed to get ceph status");
                (status_on_error(&e.to_string()), CheckOutcome::Failure)
            }
        };

        let condition = ClusterCondition::classify(outcome, self.config.is_external);
        let published = self.publish(&snapshot, condition).await;

        let reclaim = match outcome {
            CheckOutcome::Success => Some(configure_health_settings(&self.ceph, &snapshot).await),
            CheckOutcome::Failure => None,
        };

        if let Some(state) = &self.health_state {
            state.metrics.record_check(
                &self.namespace,
                &self.name,
                started.elapsed().as_secs_f64(),
                outcome == CheckOutcome::Success,
            );
            if let Some(PublishOutcome::Updated(status)) = &published {
                state
                    .metrics
                    .set_cluster_health(&self.namespace, &self.name, &status.health);
            }
        }

        CheckReport {
            condition,
            published,
            reclaim,
        }
    }

    async fn publish(
        &self,
        snapshot: &HealthStatus,
        condition: ClusterCondition,
    ) -> Option<PublishOutcome> {
        match update_ceph_status(
            &self.store,
            &self.namespace,
            &self.name,
            snapshot,
            condition,
            self.clock.now(),
        )
        .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(
                    namespace = %self.namespace,
                    name = %self.name,
                    retryable = e.is_retryable(),
                    error = %e,
                    "failed to update cluster status"
                );
                None
            }
        }
    }
}
