//! redkeep apply: resource derivation and idempotent create.
//!
//! The platform only offers an atomic create, so every step is made re-entrant by treating
//! a name collision as success. There is no rollback: a half-applied bootstrap is finished by
//! the next invocation.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::{counter, histogram};
use redkeep_core::{PlatformError, ReconcileError, ResourceSpec};
use redkeep_kubehub::{cancellable, Platform};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod bundle;
mod factory;

pub use factory::{validate_label, ClusterTemplate, ResourceFactory, LABEL_LEADER_INDEX, LABEL_MANAGED_BY, MANAGED_BY};

/// How an apply succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    Created,
    AlreadyExisted,
}

/// Guarded create over a [`Platform`].
#[derive(Clone, Copy)]
pub struct Applier<'a> {
    platform: &'a dyn Platform,
}

impl<'a> Applier<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    /// Creates `spec`. A pre-existing object with the same name is logged and reported as
    /// [`ApplyOutcome::AlreadyExisted`]; any other failure is returned unchanged.
    pub async fn apply(&self, spec: &ResourceSpec, cancel: &CancellationToken) -> Result<ApplyOutcome, ReconcileError> {
        let t0 = Instant::now();
        let resource = spec.describe();
        debug!(resource = %resource, "applying");
        let res = cancellable(cancel, self.platform.create(spec)).await;
        histogram!("redkeep_apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(()) => {
                counter!("redkeep_apply_total", 1u64, "outcome" => "created");
                info!(resource = %resource, "created");
                Ok(ApplyOutcome::Created)
            }
            Err(e) if e.is_already_exists() => {
                counter!("redkeep_apply_total", 1u64, "outcome" => "already_exists");
                info!(resource = %resource, "{} already exists", spec.kind());
                Ok(ApplyOutcome::AlreadyExisted)
            }
            Err(PlatformError::Cancelled) => {
                warn!(resource = %resource, "apply cancelled");
                Err(ReconcileError::Cancelled)
            }
            Err(e) => {
                counter!("redkeep_apply_total", 1u64, "outcome" => "error");
                warn!(resource = %resource, error = %e, "apply failed");
                Err(ReconcileError::ResourceApply { resource, source: e })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redkeep_core::DesiredTopology;
    use redkeep_kubehub::fake::FakePlatform;

    fn config_spec() -> ResourceSpec {
        let t = DesiredTopology::new("prod", "cache", 3, 1).unwrap();
        let tpl = ClusterTemplate::new("orders", "redis:7.2", 6379);
        ResourceFactory::new(&t, &tpl).config().unwrap()
    }

    #[tokio::test]
    async fn applying_twice_is_idempotent() {
        let fake = FakePlatform::new();
        let applier = Applier::new(&fake);
        let spec = config_spec();
        let cancel = CancellationToken::new();
        assert_eq!(applier.apply(&spec, &cancel).await.unwrap(), ApplyOutcome::Created);
        assert_eq!(applier.apply(&spec, &cancel).await.unwrap(), ApplyOutcome::AlreadyExisted);
        assert_eq!(fake.attempts().len(), 2);
        assert_eq!(fake.created().len(), 1);
    }

    #[tokio::test]
    async fn other_failures_propagate_unchanged() {
        let fake = FakePlatform::new();
        let err = PlatformError::Api { code: 403, reason: "Forbidden".into(), message: "nope".into() };
        fake.fail_create("orders-config", err.clone());
        let got = Applier::new(&fake).apply(&config_spec(), &CancellationToken::new()).await.unwrap_err();
        match got {
            ReconcileError::ResourceApply { resource, source } => {
                assert_eq!(resource, "ConfigMap prod/orders-config");
                assert_eq!(source, err);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn textual_collision_from_platform_is_recovered() {
        let fake = FakePlatform::new();
        fake.fail_create(
            "orders-config",
            PlatformError::from_message("ConfigMap", "orders-config", "configmaps \"orders-config\" already exists"),
        );
        let got = Applier::new(&fake).apply(&config_spec(), &CancellationToken::new()).await;
        assert_eq!(got.unwrap(), ApplyOutcome::AlreadyExisted);
    }

    #[tokio::test]
    async fn cancelled_apply_does_not_reach_platform() {
        let fake = FakePlatform::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let got = Applier::new(&fake).apply(&config_spec(), &cancel).await.unwrap_err();
        assert!(got.is_cancelled());
        assert!(fake.attempts().is_empty());
    }
}
