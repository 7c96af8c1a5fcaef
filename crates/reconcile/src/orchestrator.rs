use std::time::Instant;

use metrics::{counter, histogram};
use redkeep_apply::{Applier, ApplyOutcome, ClusterTemplate, ResourceFactory};
use redkeep_core::{ClusterKey, DesiredTopology, LifecyclePhase, PhaseLatch, ReconcileError};
use redkeep_kubehub::Platform;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::{plan, BootstrapStep};

/// Result of the follower hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowerOutcome {
    /// No follower creation is wired in; the phase latch stays at `Initializing`.
    NotImplemented,
    /// Followers were created; the orchestrator advances the latch to `Ready`.
    Provisioned,
}

/// Hook run after every leader step succeeded.
///
/// Follower creation is not part of the bootstrap today. [`Unprovisioned`] is the shipped
/// implementation and does nothing.
#[async_trait::async_trait]
pub trait FollowerProvisioner: Send + Sync {
    async fn provision(
        &self,
        key: &ClusterKey,
        factory: &ResourceFactory<'_>,
        applier: &Applier<'_>,
        cancel: &CancellationToken,
    ) -> Result<FollowerOutcome, ReconcileError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Unprovisioned;

#[async_trait::async_trait]
impl FollowerProvisioner for Unprovisioned {
    async fn provision(
        &self,
        key: &ClusterKey,
        _factory: &ResourceFactory<'_>,
        _applier: &Applier<'_>,
        _cancel: &CancellationToken,
    ) -> Result<FollowerOutcome, ReconcileError> {
        debug!(cluster = %key, "follower provisioning not implemented; leaving phase at Initializing");
        Ok(FollowerOutcome::NotImplemented)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub steps: Vec<(BootstrapStep, ApplyOutcome)>,
    pub followers: FollowerOutcome,
}

impl BootstrapReport {
    pub fn created(&self) -> usize {
        self.steps.iter().filter(|(_, o)| *o == ApplyOutcome::Created).count()
    }

    pub fn already_existed(&self) -> usize {
        self.steps.iter().filter(|(_, o)| *o == ApplyOutcome::AlreadyExisted).count()
    }
}

/// Creates the resources a cluster needs, in order, one idempotent step at a time.
///
/// Callers must not run two bootstraps for the same cluster concurrently; the controller
/// runtime guarantees one active reconcile per object.
pub struct Orchestrator<'a> {
    platform: &'a dyn Platform,
    latch: &'a PhaseLatch,
    followers: &'a dyn FollowerProvisioner,
    create_namespace: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(platform: &'a dyn Platform, latch: &'a PhaseLatch, followers: &'a dyn FollowerProvisioner) -> Self {
        Self { platform, latch, followers, create_namespace: false }
    }

    pub fn create_namespace(mut self, on: bool) -> Self {
        self.create_namespace = on;
        self
    }

    pub fn platform(&self) -> &'a dyn Platform {
        self.platform
    }

    pub fn latch(&self) -> &'a PhaseLatch {
        self.latch
    }

    /// Derives and applies a single step.
    pub async fn run_step(
        &self,
        step: BootstrapStep,
        factory: &ResourceFactory<'_>,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let spec = step.derive(factory).map_err(|e| {
            warn!(step = %step, error = %e, "spec derivation failed");
            ReconcileError::SpecDerivation(e)
        })?;
        Applier::new(self.platform).apply(&spec, cancel).await
    }

    /// Marks the cluster `Initializing`, then runs every planned step in order. The first
    /// fatal error aborts the remaining steps; nothing already created is rolled back, and the
    /// bootstrap stays unfinished in the latch so the next cycle runs it again.
    pub async fn bootstrap(
        &self,
        key: &ClusterKey,
        topology: &DesiredTopology,
        template: &ClusterTemplate,
        cancel: &CancellationToken,
    ) -> Result<BootstrapReport, ReconcileError> {
        let t0 = Instant::now();
        counter!("redkeep_bootstrap_total", 1u64);
        self.latch.set(key, LifecyclePhase::Initializing);
        self.latch.begin_bootstrap(key);

        let factory = ResourceFactory::new(topology, template);
        let steps = plan(topology, self.create_namespace);
        info!(cluster = %key, leaders = topology.leaders(), steps = steps.len(), "bootstrap starting");

        let res = self.run_plan(key, &steps, &factory, cancel).await;
        histogram!("redkeep_bootstrap_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(report) => {
                self.latch.finish_bootstrap(key);
                info!(
                    cluster = %key,
                    created = report.created(),
                    already_existed = report.already_existed(),
                    followers = ?report.followers,
                    "bootstrap finished"
                );
            }
            Err(e) => {
                counter!("redkeep_bootstrap_failures_total", 1u64);
                warn!(cluster = %key, error = %e, "bootstrap aborted");
            }
        }
        res
    }

    async fn run_plan(
        &self,
        key: &ClusterKey,
        steps: &[BootstrapStep],
        factory: &ResourceFactory<'_>,
        cancel: &CancellationToken,
    ) -> Result<BootstrapReport, ReconcileError> {
        let mut done = Vec::with_capacity(steps.len());
        for &step in steps {
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled);
            }
            if let BootstrapStep::Leader(i) = step {
                info!(cluster = %key, "deploying leader-{}", i);
            }
            let outcome = self.run_step(step, factory, cancel).await?;
            done.push((step, outcome));
        }

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        let applier = Applier::new(self.platform);
        let followers = self.followers.provision(key, factory, &applier, cancel).await?;
        if followers == FollowerOutcome::Provisioned {
            self.latch.set(key, LifecyclePhase::Ready);
        }
        Ok(BootstrapReport { steps: done, followers })
    }
}
