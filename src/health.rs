//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the controller is watching)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::client::{HEALTH_ERR, HEALTH_OK, HEALTH_WARN};

/// Port the health server listens on.
pub const HEALTH_PORT: u16 = 8080;

/// Labels identifying a CephCluster
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
}

impl ClusterLabels {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl EncodeLabelSet for ClusterLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Numeric form of a Ceph health string: 0 OK, 1 WARN, 2 ERR, -1 otherwise.
pub fn health_value(health: &str) -> i64 {
    match health {
        HEALTH_OK => 0,
        HEALTH_WARN => 1,
        HEALTH_ERR => 2,
        _ => -1,
    }
}

/// Shared metrics for the operator
pub struct Metrics {
    /// Status checks performed
    pub health_checks_total: Family<ClusterLabels, Counter>,
    /// Status checks where `ceph status` failed
    pub health_check_failures_total: Family<ClusterLabels, Counter>,
    /// Status check duration histogram
    pub health_check_duration_seconds: Family<ClusterLabels, Histogram>,
    /// Last published health per cluster
    pub cluster_health: Family<ClusterLabels, Gauge>,
    /// Running status checkers
    pub pollers: Gauge,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let health_checks_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "cephoperator_health_checks",
            "Total number of ceph status checks",
            health_checks_total.clone(),
        );

        let health_check_failures_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "cephoperator_health_check_failures",
            "Total number of ceph status checks that could not reach the cluster",
            health_check_failures_total.clone(),
        );

        let health_check_duration_seconds =
            Family::<ClusterLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.01, 2.0, 12))
            });
        registry.register(
            "cephoperator_health_check_duration_seconds",
            "Duration of ceph status checks in seconds",
            health_check_duration_seconds.clone(),
        );

        let cluster_health = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "cephoperator_cluster_health",
            "Last published ceph health (0 OK, 1 WARN, 2 ERR, -1 unknown)",
            cluster_health.clone(),
        );

        let pollers = Gauge::default();
        registry.register(
            "cephoperator_pollers",
            "Number of running ceph status checkers",
            pollers.clone(),
        );

        Self {
            health_checks_total,
            health_check_failures_total,
            health_check_duration_seconds,
            cluster_health,
            pollers,
            registry,
        }
    }

    /// Record a completed status check
    pub fn record_check(&self, namespace: &str, name: &str, duration_secs: f64, success: bool) {
        let labels = ClusterLabels::new(namespace, name);
        self.health_checks_total.get_or_create(&labels).inc();
        self.health_check_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
        if !success {
            self.health_check_failures_total
                .get_or_create(&labels)
                .inc();
        }
    }

    /// Update the published health of a cluster
    pub fn set_cluster_health(&self, namespace: &str, name: &str, health: &str) {
        self.cluster_health
            .get_or_create(&ClusterLabels::new(namespace, name))
            .set(health_value(health));
    }

    /// Drop the per-cluster series of a deleted cluster
    pub fn remove_cluster(&self, namespace: &str, name: &str) {
        let labels = ClusterLabels::new(namespace, name);
        self.health_checks_total.remove(&labels);
        self.health_check_failures_total.remove(&labels);
        self.health_check_duration_seconds.remove(&labels);
        self.cluster_health.remove(&labels);
    }

    /// Update the number of running checkers
    pub fn set_pollers(&self, count: usize) {
        self.pollers
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (acquired leadership and watching clusters)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the controller is watching.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on 0.0.0.0:8080
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], HEALTH_PORT));
    info!(port = HEALTH_PORT, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
