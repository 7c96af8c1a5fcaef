//! redkeep schema: the `RedisCluster` custom resource and its status.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use kube::{CustomResource, CustomResourceExt, ResourceExt};
use redkeep_core::{ClusterKey, DesiredTopology, LifecyclePhase, TopologyError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RedisCluster declares a redis cluster with a leader/follower topology.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "db.redkeep.io",
    version = "v1",
    kind = "RedisCluster",
    plural = "redisclusters",
    shortname = "rdc",
    namespaced,
    status = "RedisClusterStatus",
    printcolumn = r#"{"name":"Leaders", "type":"integer", "jsonPath":".spec.leaderReplicas"}"#,
    printcolumn = r#"{"name":"Followers", "type":"integer", "jsonPath":".spec.leaderFollowers"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    /// Number of leader nodes. Must be at least 1.
    #[serde(default = "default_leader_replicas")]
    pub leader_replicas: i32,

    /// Followers per leader.
    #[serde(default = "default_leader_followers")]
    pub leader_followers: i32,

    /// Labels identifying the cluster's pods.
    pub pod_label_selector: PodLabelSelector,

    /// Redis image for every node.
    #[serde(default = "default_image")]
    pub image: String,

    /// Client port; the cluster bus listens on `port + 10000`.
    #[serde(default = "default_port")]
    pub port: i32,

    /// Extra redis.conf directives.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub redis_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PodLabelSelector {
    pub app: String,
}

fn default_leader_replicas() -> i32 {
    3
}

fn default_leader_followers() -> i32 {
    1
}

fn default_image() -> String {
    "redis:7.2".to_string()
}

fn default_port() -> i32 {
    6379
}

impl RedisClusterSpec {
    /// Desired topology for this spec in `namespace`.
    pub fn topology(&self, namespace: &str) -> Result<DesiredTopology, TopologyError> {
        let leaders = non_negative("leaderReplicas", self.leader_replicas)?;
        let followers = non_negative("leaderFollowers", self.leader_followers)?;
        DesiredTopology::new(namespace, self.pod_label_selector.app.clone(), leaders, followers)
    }
}

fn non_negative(field: &'static str, value: i32) -> Result<u32, TopologyError> {
    u32::try_from(value).map_err(|_| TopologyError::Negative { field, value: i64::from(value) })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterStatus {
    #[serde(default)]
    pub phase: LifecyclePhase,

    /// Observed leader pods.
    #[serde(default)]
    pub leaders: i32,

    /// Observed follower pods.
    #[serde(default)]
    pub followers: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RedisClusterStatus {
    /// Status for a fresh observation. The transition time is carried over from `previous`
    /// unless the phase changed.
    pub fn observed(
        phase: LifecyclePhase,
        leaders: usize,
        followers: usize,
        previous: Option<&RedisClusterStatus>,
    ) -> Self {
        let last_transition_time = match previous {
            Some(prev) if prev.phase == phase => prev.last_transition_time.clone(),
            _ => Some(chrono::Utc::now().to_rfc3339()),
        };
        Self {
            phase,
            leaders: i32::try_from(leaders).unwrap_or(i32::MAX),
            followers: i32::try_from(followers).unwrap_or(i32::MAX),
            last_transition_time,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl RedisCluster {
    /// Identity used to key per-cluster reconciler state. `None` when not namespaced.
    pub fn key(&self) -> Option<ClusterKey> {
        Some(ClusterKey::new(self.namespace()?, self.name_any()))
    }
}

/// CRD manifest as YAML.
pub fn crd_yaml() -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&RedisCluster::crd())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_from(json: serde_json::Value) -> RedisClusterSpec {
        serde_json::from_value(json).expect("valid spec")
    }

    #[test]
    fn spec_defaults_apply() {
        let spec = spec_from(serde_json::json!({ "podLabelSelector": { "app": "cache" } }));
        assert_eq!(spec.leader_replicas, 3);
        assert_eq!(spec.leader_followers, 1);
        assert_eq!(spec.image, "redis:7.2");
        assert_eq!(spec.port, 6379);
        let t = spec.topology("prod").expect("valid topology");
        assert_eq!((t.leaders(), t.followers_per_leader(), t.app(), t.namespace()), (3, 1, "cache", "prod"));
    }

    #[test]
    fn negative_or_zero_counts_are_rejected() {
        let spec = spec_from(serde_json::json!({ "leaderReplicas": -1, "podLabelSelector": { "app": "cache" } }));
        assert!(matches!(spec.topology("ns"), Err(TopologyError::Negative { field: "leaderReplicas", .. })));
        let spec = spec_from(serde_json::json!({ "leaderReplicas": 0, "podLabelSelector": { "app": "cache" } }));
        assert_eq!(spec.topology("ns"), Err(TopologyError::ZeroLeaders));
    }

    #[test]
    fn status_keeps_transition_time_while_phase_is_stable() {
        let first = RedisClusterStatus::observed(LifecyclePhase::Initializing, 0, 0, None);
        let mut pinned = first.clone();
        pinned.last_transition_time = Some("2020-01-01T00:00:00+00:00".into());
        let same = RedisClusterStatus::observed(LifecyclePhase::Initializing, 1, 0, Some(&pinned));
        assert_eq!(same.last_transition_time.as_deref(), Some("2020-01-01T00:00:00+00:00"));
        let moved = RedisClusterStatus::observed(LifecyclePhase::Ready, 3, 3, Some(&pinned));
        assert_ne!(moved.last_transition_time.as_deref(), Some("2020-01-01T00:00:00+00:00"));
    }

    #[test]
    fn crd_yaml_names_group_and_kind() {
        let yaml = crd_yaml().expect("crd renders");
        assert!(yaml.contains("db.redkeep.io"));
        assert!(yaml.contains("RedisCluster"));
        assert!(yaml.contains("redisclusters"));
    }
}
