//! Corrective settings derived from Ceph health checks.
//!
//! When the monitors still allow insecure global_id reclaim
//! (CVE-2021-20288) but no client depends on it any more, the option is
//! turned off. The decision is re-evaluated from scratch on every check.

use tracing::{debug, info, warn};

use crate::client::{CephHealthApi, HealthStatus};

/// Check raised while monitors allow insecure global_id reclaim.
pub const INSECURE_GLOBAL_ID_RECLAIM_ALLOWED: &str = "AUTH_INSECURE_GLOBAL_ID_RECLAIM_ALLOWED";
/// Check raised while clients are reclaiming global_id insecurely.
pub const INSECURE_GLOBAL_ID_RECLAIM: &str = "AUTH_INSECURE_GLOBAL_ID_RECLAIM";

const GLOBAL_ID_RECLAIM_WHO: &str = "mon";
const GLOBAL_ID_RECLAIM_OPTION: &str = "auth_allow_insecure_global_id_reclaim";

/// What the global_id reclaim policy did during a check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalIdReclaimAction {
    /// Insecure reclaim is not allowed; nothing to do.
    NotApplicable,
    /// Insecure reclaim was disabled.
    Disabled,
    /// Disabling insecure reclaim failed.
    DisableFailed,
    /// Legacy clients still rely on insecure reclaim; left enabled.
    LegacyClientsConnected,
}

/// Log the active health checks and apply corrective settings.
pub async fn configure_health_settings<C>(ceph: &C, health: &HealthStatus) -> GlobalIdReclaimAction
where
    C: CephHealthApi,
{
    for (code, check) in &health.checks {
        debug!(
            severity = %check.severity,
            code = %code,
            message = %check.summary.message,
            "Health check"
        );
    }

    if !health.has_check(INSECURE_GLOBAL_ID_RECLAIM_ALLOWED) {
        return GlobalIdReclaimAction::NotApplicable;
    }

    if health.has_check(INSECURE_GLOBAL_ID_RECLAIM) {
        warn!(
            "insecure clients are connected to the cluster, to resolve the {} health warning \
             please refer to the upgrade guide to ensure all Ceph daemons are updated.",
            INSECURE_GLOBAL_ID_RECLAIM
        );
        return GlobalIdReclaimAction::LegacyClientsConnected;
    }

    info!(
        "Disabling the insecure global ID as no legacy clients are currently connected. \
         If you still require the insecure connections, see the CVE to suppress the health \
         warning and re-enable the insecure connections. \
         https://docs.ceph.com/en/latest/security/CVE-2021-20288/"
    );
    match ceph
        .set_config(GLOBAL_ID_RECLAIM_WHO, GLOBAL_ID_RECLAIM_OPTION, "false")
        .await
    {
        Ok(()) => {
            info!("insecure global ID is now disabled");
            GlobalIdReclaimAction::Disabled
        }
        Err(e) => {
            warn!(error = %e, "failed to disable the insecure global ID");
            GlobalIdReclaimAction::DisableFailed
        }
    }
}
