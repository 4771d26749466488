//! Controller module for ceph-status-operator.
//!
//! Contains the per-cluster status checker, the health-to-status projection,
//! condition classification, corrective health settings and the registry of
//! running checkers.

// Shared modules
pub mod config;
pub mod context;
pub mod error;
pub mod status;

// Status checking
pub mod checker;
pub mod condition;
pub mod health_settings;
pub mod publisher;
pub mod supervisor;
