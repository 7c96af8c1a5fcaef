use metrics::{counter, gauge};
use redkeep_apply::ClusterTemplate;
use redkeep_core::{classify_topology, ClusterKey, DesiredTopology, LifecyclePhase, ReconcileError};
use redkeep_kubehub::{observe_cluster, ClusterObservation};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::orchestrator::{BootstrapReport, Orchestrator};

/// What one reconcile cycle saw and did.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub phase: LifecyclePhase,
    pub previous: LifecyclePhase,
    pub observation: ClusterObservation,
    /// Present when the cycle started a bootstrap.
    pub bootstrap: Option<BootstrapReport>,
}

/// Observe, classify against the latch, and bootstrap a cluster that does not exist yet.
///
/// A bootstrap that failed or was cancelled part way is run again while the cluster reads as
/// `Initializing` or `Unknown`; idempotent applies skip what already exists. Otherwise
/// `Initializing`, `Ready` and `Unknown` take no action here: scaling and repair are outside
/// the reconciler's responsibility.
pub async fn run_cycle(
    orchestrator: &Orchestrator<'_>,
    key: &ClusterKey,
    topology: &DesiredTopology,
    template: &ClusterTemplate,
    cancel: &CancellationToken,
) -> Result<CycleOutcome, ReconcileError> {
    let observation = observe_cluster(orchestrator.platform(), topology, cancel).await?;
    let latch = orchestrator.latch();
    let previous = latch.get(key);
    let unfinished = latch.bootstrap_unfinished(key);
    let phase = classify_topology(topology, &observation.leaders, &observation.followers, previous);
    counter!("redkeep_phase_total", 1u64, "phase" => phase.as_str());
    gauge!("redkeep_latched_clusters", latch.len() as f64);
    info!(
        cluster = %key,
        phase = %phase,
        previous = %previous,
        leaders = observation.leaders.len(),
        followers = observation.followers.len(),
        unfinished,
        "cluster phase classified"
    );

    let resume = match phase {
        LifecyclePhase::NotExists => true,
        LifecyclePhase::Initializing | LifecyclePhase::Unknown => unfinished,
        LifecyclePhase::Ready => {
            latch.finish_bootstrap(key);
            false
        }
    };
    let bootstrap = if resume {
        if phase != LifecyclePhase::NotExists {
            info!(cluster = %key, phase = %phase, "resuming unfinished bootstrap");
        }
        Some(orchestrator.bootstrap(key, topology, template, cancel).await?)
    } else {
        None
    };
    Ok(CycleOutcome { phase, previous, observation, bootstrap })
}
