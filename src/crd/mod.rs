//! Custom Resource Definitions (CRDs) for ceph-status-operator.
//!
//! - `CephCluster`: the tracked resource whose status carries Ceph health

mod ceph_cluster;

pub use ceph_cluster::*;
