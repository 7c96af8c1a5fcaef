use std::fmt;

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// The closed set of resource kinds a bootstrap creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Namespace,
    Config,
    Service,
    HeadlessService,
    LeaderPod,
}

impl ResourceKind {
    /// Kind name as known by the platform API.
    pub fn api_kind(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Config => "ConfigMap",
            ResourceKind::Service | ResourceKind::HeadlessService => "Service",
            ResourceKind::LeaderPod => "Pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Config => "config",
            ResourceKind::Service => "service",
            ResourceKind::HeadlessService => "headless-service",
            ResourceKind::LeaderPod => "leader-pod",
        };
        f.write_str(s)
    }
}

/// A fully derived, declarative resource ready to be submitted to the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Namespace(Namespace),
    Config(ConfigMap),
    Service(Service),
    HeadlessService(Service),
    LeaderPod { index: u32, pod: Box<Pod> },
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Namespace(_) => ResourceKind::Namespace,
            ResourceSpec::Config(_) => ResourceKind::Config,
            ResourceSpec::Service(_) => ResourceKind::Service,
            ResourceSpec::HeadlessService(_) => ResourceKind::HeadlessService,
            ResourceSpec::LeaderPod { .. } => ResourceKind::LeaderPod,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ResourceSpec::Namespace(o) => &o.metadata,
            ResourceSpec::Config(o) => &o.metadata,
            ResourceSpec::Service(o) | ResourceSpec::HeadlessService(o) => &o.metadata,
            ResourceSpec::LeaderPod { pod, .. } => &pod.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// `None` for cluster-scoped kinds.
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Human-readable `Kind ns/name` for logs and errors.
    pub fn describe(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{} {}/{}", self.kind().api_kind(), ns, self.name()),
            None => format!("{} {}", self.kind().api_kind(), self.name()),
        }
    }
}
