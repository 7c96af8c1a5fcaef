//! In-memory [`Platform`] for tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use redkeep_core::{NodeRole, PlatformError, ResourceSpec, RoleSelector, WorkloadRecord};

use crate::Platform;

type ObjKey = (&'static str, String, String);

#[derive(Default)]
struct FakeState {
    existing: BTreeSet<ObjKey>,
    workloads: Vec<WorkloadRecord>,
    attempts: Vec<String>,
    created: Vec<ResourceSpec>,
    create_failures: HashMap<String, PlatformError>,
    list_failure: Option<PlatformError>,
    lists: usize,
}

/// Fake platform. Creates are recorded in call order; a second create of the same
/// kind/namespace/name collides. Created leader pods become listable workloads.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
    create_delay: Option<Duration>,
}

fn key_of(spec: &ResourceSpec) -> ObjKey {
    (
        spec.kind().api_kind(),
        spec.namespace().unwrap_or_default().to_string(),
        spec.name().to_string(),
    )
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every create sleeps this long before taking effect.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a live workload that `list` will report when its labels match.
    pub fn add_workload(&self, namespace: &str, name: &str, app: &str, role: NodeRole) {
        let labels = [
            (redkeep_core::LABEL_APP.to_string(), app.to_string()),
            (redkeep_core::LABEL_ROLE.to_string(), role.as_str().to_string()),
        ];
        self.state().workloads.push(WorkloadRecord {
            uid: None,
            namespace: namespace.to_string(),
            name: name.to_string(),
            role,
            status: Some("Running".to_string()),
            labels: labels.into_iter().collect(),
        });
    }

    /// Marks an object as already present, as if left over from an earlier run.
    pub fn seed_existing(&self, spec: &ResourceSpec) {
        self.state().existing.insert(key_of(spec));
        if let ResourceSpec::LeaderPod { .. } = spec {
            self.track_pod(spec);
        }
    }

    /// Fails every create of an object named `name` with `err`.
    pub fn fail_create(&self, name: &str, err: PlatformError) {
        self.state().create_failures.insert(name.to_string(), err);
    }

    /// Fails every list call with `err`.
    pub fn fail_list(&self, err: PlatformError) {
        self.state().list_failure = Some(err);
    }

    /// Drops every injected create and list failure.
    pub fn clear_failures(&self) {
        let mut st = self.state();
        st.create_failures.clear();
        st.list_failure = None;
    }

    /// `describe()` of every create call, including failed and colliding ones.
    pub fn attempts(&self) -> Vec<String> {
        self.state().attempts.clone()
    }

    /// Specs whose create succeeded, in order.
    pub fn created(&self) -> Vec<ResourceSpec> {
        self.state().created.clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.state().created.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state().lists
    }

    fn track_pod(&self, spec: &ResourceSpec) {
        if let ResourceSpec::LeaderPod { pod, .. } = spec {
            let meta = &pod.metadata;
            let record = WorkloadRecord {
                uid: None,
                namespace: meta.namespace.clone().unwrap_or_default(),
                name: meta.name.clone().unwrap_or_default(),
                role: NodeRole::Leader,
                status: Some("Pending".to_string()),
                labels: meta.labels.clone().unwrap_or_default().into_iter().collect(),
            };
            self.state().workloads.push(record);
        }
    }
}

#[async_trait::async_trait]
impl Platform for FakePlatform {
    async fn list(&self, selector: &RoleSelector) -> Result<Vec<WorkloadRecord>, PlatformError> {
        let mut st = self.state();
        st.lists += 1;
        if let Some(err) = st.list_failure.clone() {
            return Err(err);
        }
        Ok(st
            .workloads
            .iter()
            .filter(|w| w.namespace == selector.namespace)
            .filter(|w| selector.matches(w.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
            .map(|w| WorkloadRecord { role: selector.role, ..w.clone() })
            .collect())
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<(), PlatformError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let key = key_of(spec);
        {
            let mut st = self.state();
            st.attempts.push(spec.describe());
            if let Some(err) = st.create_failures.get(spec.name()).cloned() {
                return Err(err);
            }
            if !st.existing.insert(key) {
                return Err(PlatformError::from_message(
                    spec.kind().api_kind(),
                    spec.name(),
                    format!("{} {:?} already exists", spec.kind().api_kind(), spec.name()),
                ));
            }
            st.created.push(spec.clone());
        }
        self.track_pod(spec);
        Ok(())
    }
}
