//! Lifecycle of the per-cluster status checkers.
//!
//! Each CephCluster gets exactly one checker task, owning a child of the
//! operator's root cancellation token. Deleting the cluster cancels its
//! checker; cancelling the root token stops all of them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::health::HealthState;

/// Identity of a CephCluster.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

struct Poller {
    uid: Option<String>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of running status checkers.
pub struct PollerRegistry {
    root: CancellationToken,
    pollers: HashMap<ClusterKey, Poller>,
    /// Cancelled checkers that may still be finishing a check.
    retiring: Vec<JoinHandle<()>>,
    health_state: Option<Arc<HealthState>>,
}

impl PollerRegistry {
    /// Create a registry whose checkers stop when `root` is cancelled.
    pub fn new(root: CancellationToken, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            root,
            pollers: HashMap::new(),
            retiring: Vec::new(),
            health_state,
        }
    }

    /// Start a checker for `key` unless a live one for the same object exists.
    ///
    /// A different `uid` means the cluster was deleted and recreated under the
    /// same name, so the old checker is replaced. The replacement starts only
    /// once the old checker has returned. Returns `true` when a new checker
    /// was started.
    pub fn ensure<F, Fut>(&mut self, key: ClusterKey, uid: Option<String>, start: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            return false;
        }

        let mut previous = None;
        if let Some(existing) = self.pollers.get(&key) {
            let same_object = existing.uid == uid;
            if same_object && !existing.handle.is_finished() {
                return false;
            }
            if !same_object {
                info!(cluster = %key, "CephCluster was recreated, restarting status checker");
            } else {
                warn!(cluster = %key, "Status checker exited, restarting");
            }
            previous = self
                .pollers
                .remove(&key)
                .map(|poller| self.retire(&key, poller));
        }

        let token = self.root.child_token();
        let checker = start(token.clone());
        let handle = {
            let token = token.clone();
            tokio::spawn(async move {
                if let Some(previous) = previous {
                    let _ = previous.await;
                    if token.is_cancelled() {
                        return;
                    }
                }
                checker.await;
            })
        };
        debug!(cluster = %key, "Started status checker");
        self.pollers.insert(key, Poller { uid, token, handle });
        self.update_metrics();
        true
    }

    /// Cancel the checker for `key`. Returns `true` if one was running.
    ///
    /// The checker's metric series are removed once its current check, if
    /// any, has returned.
    pub fn stop(&mut self, key: &ClusterKey) -> bool {
        let Some(poller) = self.pollers.remove(key) else {
            return false;
        };
        let retired = self.retire(key, poller);
        self.retiring.retain(|handle| !handle.is_finished());
        self.retiring.push(retired);
        self.update_metrics();
        true
    }

    /// Cancel every checker whose cluster is not in `live`.
    ///
    /// Used after a watch relist, where deletions may have been missed.
    pub fn retain(&mut self, live: &HashSet<ClusterKey>) -> usize {
        let stale: Vec<ClusterKey> = self
            .pollers
            .keys()
            .filter(|key| !live.contains(*key))
            .cloned()
            .collect();
        for key in &stale {
            info!(cluster = %key, "CephCluster no longer exists, stopping status checker");
            self.stop(key);
        }
        stale.len()
    }

    /// Whether a live checker exists for `key`.
    pub fn is_running(&self, key: &ClusterKey) -> bool {
        self.pollers
            .get(key)
            .is_some_and(|p| !p.handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }

    /// Cancel all checkers and wait for them to return.
    pub async fn shutdown(&mut self) {
        self.root.cancel();
        let pollers: Vec<(ClusterKey, Poller)> = self.pollers.drain().collect();
        info!(count = pollers.len(), "Stopping status checkers");
        for (key, poller) in pollers {
            let retired = self.retire(&key, poller);
            self.retiring.push(retired);
        }
        for handle in self.retiring.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Status checker cleanup failed");
            }
        }
        self.update_metrics();
    }

    /// Cancel a checker and return a task that completes after the checker
    /// returned and its metric series were removed.
    fn retire(&self, key: &ClusterKey, poller: Poller) -> JoinHandle<()> {
        poller.token.cancel();
        debug!(cluster = %key, "Cancelled status checker");
        let key = key.clone();
        let health_state = self.health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = poller.handle.await {
                warn!(cluster = %key, error = %e, "Status checker task failed");
            }
            if let Some(state) = health_state {
                state.metrics.remove_cluster(&key.namespace, &key.name);
            }
            debug!(cluster = %key, "Status checker stopped");
        })
    }

    fn update_metrics(&self) {
        if let Some(state) = &self.health_state {
            state.metrics.set_pollers(self.pollers.len());
        }
    }
}
