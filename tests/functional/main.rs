// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the ceph status checker.
//!
//! These tests drive the real checker loop against in-memory fakes of the
//! Ceph CLI and the Kubernetes API, WITHOUT requiring a live cluster. Tokio
//! time is paused so intervals elapse instantly and deterministically.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_health_transition_history
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Checker tests**: A single check and its effect on the stored resource
//! - **Loop tests**: Scheduling, cancellation and resilience of the loop
//! - **Scenario tests**: Multi-step health histories

#[path = "../common/mod.rs"]
mod common;

mod loop_tests;
mod scenario_tests;

pub use common::*;
