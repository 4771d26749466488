//! ceph-status-operator - keeps CephCluster status in sync with `ceph status`.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Runs leader election (required for HA deployments)
//! - Starts the controller and the health server

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ceph_status_operator::health::{HealthState, run_health_server};
use ceph_status_operator::run_controller;

/// Lease configuration
const LEASE_NAME: &str = "ceph-status-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Time allowed for in-flight status checks to finish during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 20;

/// Restrict monitoring to one namespace
const WATCH_NAMESPACE_ENV: &str = "ROOK_CURRENT_NAMESPACE_ONLY";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ceph_status_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    info!("Starting ceph-status-operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Get pod identity for leader election
    let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
        warn!("POD_NAMESPACE not set, using 'rook-ceph'");
        "rook-ceph".to_string()
    });
    let watch_namespace = std::env::var(WATCH_NAMESPACE_ENV)
        .is_ok_and(|v| v == "true")
        .then(|| namespace.clone());

    info!(
        holder_id = %pod_name,
        namespace = %namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately (probes should work even as non-leader)
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lease_lock = LeaseLock::new(client.clone(), &namespace, lease_params(&pod_name));

    // Acquire leadership before starting controller
    info!("Waiting to acquire leadership...");
    loop {
        tokio::select! {
            result = lease_lock.try_acquire_or_renew() => match result {
                Ok(result) if result.acquired_lease => {
                    info!("Acquired leadership");
                    break;
                }
                Ok(_) => info!("Another instance is leader, waiting..."),
                Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
            },
            _ = shutdown_signal() => {
                info!("Received shutdown signal before acquiring leadership");
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    // Start lease renewal background task
    let lease_renewal_handle = {
        let lease_lock = LeaseLock::new(client.clone(), &namespace, lease_params(&pod_name));

        #[allow(clippy::exit)]
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lease_lock.try_acquire_or_renew().await {
                    Ok(result) => {
                        if !result.acquired_lease {
                            error!("Lost leadership! Shutting down...");
                            // Exit so Kubernetes restarts us and we re-enter election
                            std::process::exit(1);
                        }
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        std::process::exit(1);
                    }
                }
            }
        })
    };

    // Start controller (only runs as leader); cancelling the root token stops every checker
    let shutdown = CancellationToken::new();
    let mut controller_handle = {
        let health_state = health_state.clone();
        let controller_client = client.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            run_controller(
                controller_client,
                Some(health_state),
                watch_namespace.as_deref(),
                shutdown,
            )
            .await;
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    let signalled = tokio::select! {
        result = &mut controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
            false
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
            false
        }
        // Lease renewal task only exits via process::exit() or panic
        // so this branch is only reached on panic
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
            false
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => true,
    };

    if signalled {
        info!("Received shutdown signal, stopping status checkers...");
        shutdown.cancel();

        // Checks in flight finish before their checker returns
        match tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS),
            &mut controller_handle,
        )
        .await
        {
            Ok(Ok(())) => info!("All status checkers stopped"),
            Ok(Err(e)) => error!("Controller task panicked: {}", e),
            Err(_) => warn!(
                "Status checkers did not stop within {}s, exiting anyway",
                SHUTDOWN_GRACE_PERIOD_SECS
            ),
        }
    }

    info!("Operator stopped");
    Ok(())
}

fn lease_params(holder_id: &str) -> LeaseLockParams {
    LeaseLockParams {
        holder_id: holder_id.to_string(),
        lease_name: LEASE_NAME.to_string(),
        lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the operator cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
