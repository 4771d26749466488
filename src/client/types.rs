//! Types for parsed Ceph command output.
//!
//! These types represent the parsed output of `ceph status --format json`
//! and `ceph version`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Health label reported when the cluster is healthy.
pub const HEALTH_OK: &str = "HEALTH_OK";
/// Health label reported when the cluster has warnings.
pub const HEALTH_WARN: &str = "HEALTH_WARN";
/// Health label reported when the cluster has errors.
pub const HEALTH_ERR: &str = "HEALTH_ERR";

/// Errors that can occur when parsing Ceph output.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid status output: {0}")]
    InvalidStatus(#[from] serde_json::Error),
    #[error("Invalid version string: {0}")]
    InvalidVersion(String),
}

/// Parsed output of `ceph status --format json`.
///
/// Only the fields the operator consumes are modelled; everything else in
/// the report is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CephStatusReport {
    #[serde(default)]
    pub fsid: String,
    #[serde(default)]
    pub health: HealthStatus,
}

impl FromStr for CephStatusReport {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

/// The `health` block of a status report: an overall label plus active checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckMessage>,
}

impl HealthStatus {
    /// Create a health snapshot with a label and no checks.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            checks: BTreeMap::new(),
        }
    }

    /// Add a check to the snapshot.
    pub fn with_check(
        mut self,
        code: impl Into<String>,
        severity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.checks.insert(
            code.into(),
            CheckMessage {
                severity: severity.into(),
                summary: Summary {
                    message: message.into(),
                },
            },
        );
        self
    }

    /// Whether a check with the given code is active.
    pub fn has_check(&self, code: &str) -> bool {
        self.checks.contains_key(code)
    }
}

/// A single health check entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckMessage {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub summary: Summary,
}

/// Summary of a health check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Summary {
    #[serde(default)]
    pub message: String,
}

/// Ceph release version, e.g. 18.2.4 (build 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct CephVersion {
    pub major: u32,
    pub minor: u32,
    pub extra: u32,
    pub build: u32,
}

static VERSION_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"ceph version (\d+)\.(\d+)\.(\d+)(?:-(\d+))?").ok()
});

impl CephVersion {
    /// Label stored in the CephCluster status, e.g. "18.2.4-0".
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl FromStr for CephVersion {
    type Err = ParseError;

    /// Parse the output of `ceph version`, e.g.
    /// `ceph version 18.2.4 (e7ad5345525c7aa95470c26863873b581076945d) reef (stable)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidVersion(s.trim().to_string());
        let captures = VERSION_PATTERN
            .as_ref()
            .and_then(|re| re.captures(s))
            .ok_or_else(invalid)?;
        let number = |idx: usize| -> Result<u32, ParseError> {
            match captures.get(idx) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };
        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            extra: number(3)?,
            build: number(4)?,
        })
    }
}

impl std::fmt::Display for CephVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}-{}", self.major, self.minor, self.extra, self.build)
    }
}
