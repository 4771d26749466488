//! Ceph client module.
//!
//! Wraps the `ceph` command line tool for the operations the status checker
//! needs.
//!
//! ## Architecture
//!
//! - `ceph_client`: CLI runner, connection identity and the `CephHealthApi` seam
//! - `types`: Parsed output of `ceph status` and `ceph version`
//!
//! ## Example
//!
//! ```rust,ignore
//! use ceph_status_operator::client::{CephClient, CephHealthApi, ClusterInfo};
//!
//! let client = CephClient::new(ClusterInfo::new("rook-ceph", "rook-ceph"));
//! let report = client.status().await?;
//! println!("health: {}", report.health.status);
//! ```

pub mod ceph_client;
pub mod types;

pub use ceph_client::{CephClient, CephError, CephHealthApi, ClusterInfo};
pub use types::{
    CephStatusReport, CephVersion, CheckMessage, HEALTH_ERR, HEALTH_OK, HEALTH_WARN, HealthStatus,
    ParseError, Summary,
};
