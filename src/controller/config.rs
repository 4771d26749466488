//! Operator configuration.
//!
//! Settings are resolved once, when a status checker is created. The
//! environment is passed in as a lookup function so resolution can be tested
//! without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use jiff::SignedDuration;
use tracing::{debug, info};

use crate::client::ceph_client::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONFIG_DIR, DEFAULT_USER};
use crate::client::ClusterInfo;
use crate::crd::ClusterSpec;

/// Interval between status checks when nothing else is configured.
pub const DEFAULT_STATUS_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Environment variable overriding the status check interval for all clusters.
pub const STATUS_CHECK_INTERVAL_ENV: &str = "ROOK_CEPH_STATUS_CHECK_INTERVAL";
/// Environment variable overriding the directory holding cluster config and keyrings.
pub const CONFIG_DIR_ENV: &str = "ROOK_CEPH_CONFIG_DIR";
/// Environment variable overriding the Ceph user.
pub const USERNAME_ENV: &str = "ROOK_CEPH_USERNAME";
/// Environment variable overriding the ceph command timeout.
pub const COMMAND_TIMEOUT_ENV: &str = "ROOK_CEPH_COMMAND_TIMEOUT";

/// Parse a duration such as "10s", "1m30s" or "500ms".
///
/// Zero and negative durations are rejected.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parsed: SignedDuration = value.parse().ok()?;
    if parsed.is_zero() || parsed.is_negative() {
        return None;
    }
    Duration::try_from(parsed).ok()
}

/// Resolve the status check interval.
///
/// Precedence: environment override, then the interval configured on the
/// CephCluster, then the default. A value that does not parse is skipped.
pub fn resolve_check_interval(env_override: Option<&str>, configured: &str) -> Duration {
    let candidates = [
        (STATUS_CHECK_INTERVAL_ENV, env_override.unwrap_or_default()),
        ("spec.healthCheck.daemonHealth.status.interval", configured),
    ];
    for (source, value) in candidates {
        if value.is_empty() {
            continue;
        }
        match parse_duration(value) {
            Some(interval) => {
                info!(source, interval = %value, "ceph status check interval is {}", value);
                return interval;
            }
            None => debug!(source, value, "Ignoring unparsable status check interval"),
        }
    }
    DEFAULT_STATUS_CHECK_INTERVAL
}

/// Immutable settings of one status checker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between the end of one check and the start of the next.
    pub interval: Duration,
    /// The cluster is external (connected, not managed).
    pub is_external: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_STATUS_CHECK_INTERVAL,
            is_external: false,
        }
    }
}

impl PollerConfig {
    /// Resolve the checker settings for a cluster.
    pub fn resolve<F>(spec: &ClusterSpec, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_override = env(STATUS_CHECK_INTERVAL_ENV);
        Self {
            interval: resolve_check_interval(
                env_override.as_deref(),
                &spec.health_check.daemon_health.status.interval,
            ),
            is_external: spec.external.enable,
        }
    }
}

/// How to reach the Ceph clusters from the operator pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CephConnectionSettings {
    pub config_dir: PathBuf,
    pub user: String,
    pub command_timeout: Duration,
}

impl Default for CephConnectionSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            user: DEFAULT_USER.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl CephConnectionSettings {
    /// Load settings from an environment lookup, falling back to defaults.
    pub fn from_env<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            config_dir: env(CONFIG_DIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
            user: env(USERNAME_ENV)
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.user),
            command_timeout: env(COMMAND_TIMEOUT_ENV)
                .as_deref()
                .and_then(parse_duration)
                .unwrap_or(defaults.command_timeout),
        }
    }

    /// Connection identity for one CephCluster.
    pub fn cluster_info(&self, namespace: &str, name: &str) -> ClusterInfo {
        ClusterInfo {
            namespace: namespace.to_string(),
            name: name.to_string(),
            config_dir: self.config_dir.clone(),
            user: self.user.clone(),
        }
    }
}

/// Environment lookup backed by the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
