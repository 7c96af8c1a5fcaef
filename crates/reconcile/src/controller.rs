//! kube-runtime wiring for `RedisCluster` objects.

use std::sync::Arc;

use futures::StreamExt;
use kube::{
    api::{Api, Patch, PatchParams},
    runtime::{controller::Action, watcher, Controller},
    Client, Resource, ResourceExt,
};
use metrics::counter;
use redkeep_apply::ClusterTemplate;
use redkeep_core::{PhaseLatch, ReconcileError, TopologyError};
use redkeep_kubehub::Platform;
use redkeep_schema::{RedisCluster, RedisClusterStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cycle::{run_cycle, CycleOutcome};
use crate::orchestrator::{FollowerProvisioner, Orchestrator};
use crate::ReconcilerConfig;

/// State shared by every reconcile.
pub struct Context {
    pub client: Client,
    pub platform: Arc<dyn Platform>,
    pub latch: PhaseLatch,
    pub followers: Arc<dyn FollowerProvisioner>,
    pub config: ReconcilerConfig,
    /// Cancelled on shutdown; in-flight reconciles stop at the next platform call.
    pub shutdown: CancellationToken,
}

/// Template for the derived resources of `obj`, owned by `obj`.
pub fn template_for(obj: &RedisCluster) -> ClusterTemplate {
    let mut template = ClusterTemplate::new(obj.name_any(), obj.spec.image.clone(), obj.spec.port);
    template.redis_config = obj.spec.redis_config.clone();
    if let Some(owner) = obj.controller_owner_ref(&()) {
        template = template.with_owner(owner);
    }
    template
}

fn status_for(outcome: &CycleOutcome, previous: Option<&RedisClusterStatus>) -> RedisClusterStatus {
    let status = RedisClusterStatus::observed(
        outcome.phase,
        outcome.observation.leaders.len(),
        outcome.observation.followers.len(),
        previous,
    );
    match &outcome.bootstrap {
        Some(report) => status.with_message(format!(
            "bootstrap applied {} resources ({} already existed)",
            report.steps.len(),
            report.already_existed()
        )),
        None => status,
    }
}

async fn publish_status(client: &Client, obj: &RedisCluster, namespace: &str, status: RedisClusterStatus) {
    let api: Api<RedisCluster> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    if let Err(e) = api.patch_status(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch)).await {
        warn!(name = %obj.name_any(), ns = %namespace, error = %e, "status update failed");
    }
}

pub async fn reconcile(obj: Arc<RedisCluster>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = obj.key().ok_or(ReconcileError::InvalidTopology(TopologyError::EmptyNamespace))?;

    if obj.meta().deletion_timestamp.is_some() {
        info!(cluster = %key, "cluster deleted");
        ctx.latch.forget(&key);
        return Ok(Action::await_change());
    }

    let topology = obj.spec.topology(&key.namespace)?;
    let template = template_for(&obj);
    let cancel = ctx.shutdown.child_token();
    let orchestrator = Orchestrator::new(ctx.platform.as_ref(), &ctx.latch, ctx.followers.as_ref())
        .create_namespace(ctx.config.create_namespace);

    let outcome = run_cycle(&orchestrator, &key, &topology, &template, &cancel).await?;
    let status = status_for(&outcome, obj.status.as_ref());
    if obj.status.as_ref() != Some(&status) {
        publish_status(&ctx.client, &obj, &key.namespace, status).await;
    }
    Ok(Action::requeue(ctx.config.requeue_after(outcome.phase)))
}

pub fn error_policy(obj: Arc<RedisCluster>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    if error.is_cancelled() {
        debug!(name = %obj.name_any(), "reconcile cancelled");
    } else {
        counter!("redkeep_reconcile_errors_total", 1u64);
        warn!(name = %obj.name_any(), error = %error, "reconcile failed; requeueing");
    }
    Action::requeue(ctx.config.error_backoff)
}

/// Runs the controller until `ctx.shutdown` is cancelled.
pub async fn run_controller(ctx: Arc<Context>, watch_namespace: Option<String>) -> anyhow::Result<()> {
    let clusters: Api<RedisCluster> = match watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    };
    info!(ns = ?watch_namespace, "RedisCluster controller starting");
    let shutdown = ctx.shutdown.clone();

    Controller::new(clusters, watcher::Config::default())
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!(cluster = %obj.name, ?action, "reconciled"),
                Err(e) => warn!(error = %e, "controller stream error"),
            }
        })
        .await;

    info!("RedisCluster controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redkeep_core::{LifecyclePhase, NodeRole, WorkloadSnapshot};
    use redkeep_kubehub::ClusterObservation;
    use redkeep_schema::{PodLabelSelector, RedisClusterSpec};

    fn cluster() -> RedisCluster {
        let mut rc = RedisCluster::new(
            "orders",
            RedisClusterSpec {
                leader_replicas: 3,
                leader_followers: 1,
                pod_label_selector: PodLabelSelector { app: "cache".into() },
                image: "redis:7.2".into(),
                port: 6379,
                redis_config: [("maxmemory".to_string(), "1gb".to_string())].into_iter().collect(),
            },
        );
        rc.metadata.namespace = Some("prod".into());
        rc.metadata.uid = Some("8c1f1a3e-8d5b-4a57-9a0c-7a1d2f0c9b11".into());
        rc
    }

    #[test]
    fn template_carries_spec_and_owner() {
        let tpl = template_for(&cluster());
        assert_eq!(tpl.name, "orders");
        assert_eq!(tpl.port, 6379);
        assert_eq!(tpl.redis_config.get("maxmemory").map(String::as_str), Some("1gb"));
        let owner = tpl.owner.expect("owner reference");
        assert_eq!(owner.kind, "RedisCluster");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn status_reflects_observation() {
        let outcome = CycleOutcome {
            phase: LifecyclePhase::Unknown,
            previous: LifecyclePhase::Initializing,
            observation: ClusterObservation {
                leaders: WorkloadSnapshot::empty(NodeRole::Leader),
                followers: WorkloadSnapshot::empty(NodeRole::Follower),
            },
            bootstrap: None,
        };
        let status = status_for(&outcome, None);
        assert_eq!(status.phase, LifecyclePhase::Unknown);
        assert_eq!((status.leaders, status.followers), (0, 0));
        assert!(status.message.is_none());
    }
}
