//! redkeep reconcile: bootstrap orchestration, the per-cycle loop, and the controller.

#![forbid(unsafe_code)]

use std::time::Duration;

use redkeep_core::LifecyclePhase;

pub mod controller;
mod cycle;
mod orchestrator;
mod pipeline;

pub use controller::{error_policy, reconcile, run_controller, template_for, Context};
pub use cycle::{run_cycle, CycleOutcome};
pub use orchestrator::{BootstrapReport, FollowerOutcome, FollowerProvisioner, Orchestrator, Unprovisioned};
pub use pipeline::{plan, BootstrapStep};

/// Requeue timing and bootstrap switches for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub requeue_ready: Duration,
    pub requeue_pending: Duration,
    pub requeue_unknown: Duration,
    pub error_backoff: Duration,
    /// Create the target namespace before anything else.
    pub create_namespace: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            requeue_ready: Duration::from_secs(300),
            requeue_pending: Duration::from_secs(10),
            requeue_unknown: Duration::from_secs(30),
            error_backoff: Duration::from_secs(15),
            create_namespace: false,
        }
    }
}

impl ReconcilerConfig {
    pub fn requeue_after(&self, phase: LifecyclePhase) -> Duration {
        match phase {
            LifecyclePhase::NotExists | LifecyclePhase::Initializing => self.requeue_pending,
            LifecyclePhase::Ready => self.requeue_ready,
            LifecyclePhase::Unknown => self.requeue_unknown,
        }
    }
}
