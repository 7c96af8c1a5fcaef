use std::time::Instant;

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Service};
use kube::{
    api::{Api, ListParams, PostParams},
    Client,
};
use metrics::{counter, histogram};
use redkeep_core::{PlatformError, ResourceSpec, RoleSelector, Uid, WorkloadRecord};
use tracing::debug;
use uuid::Uuid;

use crate::Platform;

/// kube-rs backed [`Platform`].
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn map_kube_error(kind: &str, name: &str, err: kube::Error) -> PlatformError {
    match err {
        kube::Error::Api(ae) => PlatformError::from_api(kind, name, ae.code, &ae.reason, &ae.message),
        other => PlatformError::from_message(kind, name, other.to_string()),
    }
}

fn to_uid(uid_str: &str) -> Option<Uid> {
    Uuid::parse_str(uid_str).ok().map(|u| *u.as_bytes())
}

fn record_from(pod: Pod, selector: &RoleSelector) -> WorkloadRecord {
    let meta = pod.metadata;
    WorkloadRecord {
        uid: meta.uid.as_deref().and_then(to_uid),
        namespace: meta.namespace.unwrap_or_else(|| selector.namespace.clone()),
        name: meta.name.unwrap_or_default(),
        role: selector.role,
        status: pod.status.and_then(|s| s.phase),
        labels: meta.labels.unwrap_or_default().into_iter().collect(),
    }
}

async fn create_in<K>(api: Api<K>, obj: &K, kind: &str, name: &str) -> Result<(), PlatformError>
where
    K: kube::Resource + Clone + std::fmt::Debug + serde::Serialize + serde::de::DeserializeOwned,
{
    api.create(&PostParams::default(), obj)
        .await
        .map(|_| ())
        .map_err(|e| map_kube_error(kind, name, e))
}

#[async_trait::async_trait]
impl Platform for KubePlatform {
    async fn list(&self, selector: &RoleSelector) -> Result<Vec<WorkloadRecord>, PlatformError> {
        let t0 = Instant::now();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &selector.namespace);
        let query = selector.to_query();
        let lp = ListParams::default().labels(&query);
        let pods = api.list(&lp).await.map_err(|e| map_kube_error("Pod", &query, e))?;
        histogram!("redkeep_list_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(ns = %selector.namespace, selector = %query, count = pods.items.len(), "listed workloads");
        Ok(pods.items.into_iter().map(|p| record_from(p, selector)).collect())
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<(), PlatformError> {
        let kind = spec.kind().api_kind();
        let name = spec.name();
        let ns = spec.namespace().unwrap_or_default();
        counter!("redkeep_create_calls_total", 1u64, "kind" => kind);
        match spec {
            ResourceSpec::Namespace(obj) => {
                create_in::<Namespace>(Api::all(self.client.clone()), obj, kind, name).await
            }
            ResourceSpec::Config(obj) => {
                create_in::<ConfigMap>(Api::namespaced(self.client.clone(), ns), obj, kind, name).await
            }
            ResourceSpec::Service(obj) | ResourceSpec::HeadlessService(obj) => {
                create_in::<Service>(Api::namespaced(self.client.clone(), ns), obj, kind, name).await
            }
            ResourceSpec::LeaderPod { pod, .. } => {
                create_in::<Pod>(Api::namespaced(self.client.clone(), ns), pod.as_ref(), kind, name).await
            }
        }
    }
}
