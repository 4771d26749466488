//! Ceph CLI wrapper.
//!
//! Runs the `ceph` command line tool with the connection arguments of a
//! single cluster and parses its JSON output. Every command is bounded by a
//! timeout so that a wedged monitor cannot hang the caller forever.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::client::types::{CephStatusReport, CephVersion, ParseError};

/// Errors that can occur while talking to a Ceph cluster.
#[derive(Error, Debug)]
pub enum CephError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout after {duration:?}: {command}")]
    Timeout { command: String, duration: Duration },

    #[error("{command} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Operations the status checker needs from a Ceph cluster.
pub trait CephHealthApi {
    /// Fetch `ceph status`.
    fn status(&self) -> impl std::future::Future<Output = Result<CephStatusReport, CephError>> + Send;

    /// Set a centralized config option, e.g. `mon auth_allow_insecure_global_id_reclaim false`.
    fn set_config(
        &self,
        who: &str,
        option: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<(), CephError>> + Send;
}

/// Connection identity of a cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Namespace of the CephCluster; also used as the Ceph cluster name.
    pub namespace: String,
    /// Name of the CephCluster resource.
    pub name: String,
    /// Directory holding `<namespace>/<namespace>.config` and the keyring.
    pub config_dir: PathBuf,
    /// Ceph user, e.g. client.admin.
    pub user: String,
}

impl ClusterInfo {
    /// Create cluster info with the default admin user and config dir.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            user: DEFAULT_USER.to_string(),
        }
    }

    /// Path of the generated ceph.conf for this cluster.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir
            .join(&self.namespace)
            .join(format!("{}.config", self.namespace))
    }

    /// Path of the keyring for the configured user.
    pub fn keyring_file(&self) -> PathBuf {
        self.config_dir
            .join(&self.namespace)
            .join(format!("{}.keyring", self.user))
    }
}

/// Default root of per-cluster configuration.
pub const DEFAULT_CONFIG_DIR: &str = "/var/lib/rook";
/// Default Ceph user.
pub const DEFAULT_USER: &str = "client.admin";
/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

const CEPH_TOOL: &str = "ceph";

/// Ceph CLI client bound to one cluster.
#[derive(Clone, Debug)]
pub struct CephClient {
    info: ClusterInfo,
    timeout: Duration,
}

impl CephClient {
    /// Create a client with the default command timeout.
    pub fn new(info: ClusterInfo) -> Self {
        Self {
            info,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cluster this client talks to.
    pub fn cluster_info(&self) -> &ClusterInfo {
        &self.info
    }

    /// Full argument list for a ceph command, including connection flags.
    pub fn command_args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        full.push(format!("--cluster={}", self.info.namespace));
        full.push(format!("--conf={}", self.info.config_file().display()));
        full.push(format!("--name={}", self.info.user));
        full.push(format!("--keyring={}", self.info.keyring_file().display()));
        full.push(format!("--connect-timeout={}", self.timeout.as_secs().max(1)));
        full.push("--format".to_string());
        full.push("json".to_string());
        full
    }

    /// Run a ceph command and return its stdout.
    #[instrument(skip(self), fields(namespace = %self.info.namespace))]
    async fn run(&self, args: &[&str]) -> Result<String, CephError> {
        let command = format!("{} {}", CEPH_TOOL, args.join(" "));
        debug!(command = %command, "Running ceph command");

        let child = Command::new(CEPH_TOOL)
            .args(self.command_args(args))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(CephError::Spawn { command, source }),
            Err(_) => {
                return Err(CephError::Timeout {
                    command,
                    duration: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(CephError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Read a centralized config option.
    pub async fn get_config(&self, who: &str, option: &str) -> Result<String, CephError> {
        let raw = self.run(&["config", "get", who, option]).await?;
        // JSON output of a scalar option is a quoted string; plain output is not
        let value = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| raw.trim().to_string());
        Ok(value)
    }

    /// Detect the Ceph version running in the cluster.
    pub async fn version(&self) -> Result<CephVersion, CephError> {
        let raw = self.run(&["version"]).await?;
        // `--format json` wraps the banner as {"version": "ceph version ..."}
        let banner = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v.get("version").and_then(|s| s.as_str()).map(str::to_string))
            .unwrap_or(raw);
        Ok(banner.parse()?)
    }
}

impl CephHealthApi for CephClient {
    async fn status(&self) -> Result<CephStatusReport, CephError> {
        let raw = self.run(&["status"]).await?;
        Ok(raw.parse()?)
    }

    async fn set_config(&self, who: &str, option: &str, value: &str) -> Result<(), CephError> {
        // Skip the write when the option already holds the value
        match self.get_config(who, option).await {
            Ok(current) if current == value => {
                debug!(who, option, value, "Config option already set");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => debug!(who, option, error = %e, "Failed to read config option, setting anyway"),
        }
        self.run(&["config", "set", who, option, value]).await?;
        Ok(())
    }
}
