use metrics::counter;
use redkeep_core::{DesiredTopology, NodeRole, ReconcileError, RoleSelector, WorkloadSnapshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{cancellable, Platform};

/// Leader and follower snapshots taken in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterObservation {
    pub leaders: WorkloadSnapshot,
    pub followers: WorkloadSnapshot,
}

/// Snapshot of one role. A failed list yields no partial snapshot and is not retried.
pub async fn observe_role(
    platform: &dyn Platform,
    selector: &RoleSelector,
    cancel: &CancellationToken,
) -> Result<WorkloadSnapshot, ReconcileError> {
    match cancellable(cancel, platform.list(selector)).await {
        Ok(items) => {
            debug!(ns = %selector.namespace, role = %selector.role, count = items.len(), "observed workloads");
            Ok(WorkloadSnapshot::new(selector.role, items))
        }
        Err(e) => {
            counter!("redkeep_observe_errors_total", 1u64, "role" => selector.role.as_str());
            warn!(ns = %selector.namespace, role = %selector.role, error = %e, "workload list failed");
            Err(ReconcileError::PlatformQuery { role: selector.role, source: e })
        }
    }
}

/// Leader snapshot first, then followers, each with its own role selector.
pub async fn observe_cluster(
    platform: &dyn Platform,
    topology: &DesiredTopology,
    cancel: &CancellationToken,
) -> Result<ClusterObservation, ReconcileError> {
    let leaders = observe_role(platform, &topology.selector(NodeRole::Leader), cancel).await?;
    let followers = observe_role(platform, &topology.selector(NodeRole::Follower), cancel).await?;
    Ok(ClusterObservation { leaders, followers })
}
