use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ClusterKey, DesiredTopology, WorkloadSnapshot};

/// Summary judgment of where a cluster is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum LifecyclePhase {
    NotExists,
    Initializing,
    Ready,
    #[default]
    Unknown,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 4] = [
        LifecyclePhase::NotExists,
        LifecyclePhase::Initializing,
        LifecyclePhase::Ready,
        LifecyclePhase::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::NotExists => "NotExists",
            LifecyclePhase::Initializing => "Initializing",
            LifecyclePhase::Ready => "Ready",
            LifecyclePhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infers the lifecycle phase from live observations. First matching rule wins:
///
/// 1. no leaders observed: `Initializing` if a bootstrap is in flight (`previous`), else `NotExists`
/// 2. leader count and follower count both match exactly: `Ready`
/// 3. anything else: `Unknown`
pub fn classify(
    desired_leaders: u32,
    desired_followers_per_leader: u32,
    leaders: &WorkloadSnapshot,
    followers: &WorkloadSnapshot,
    previous: LifecyclePhase,
) -> LifecyclePhase {
    if leaders.is_empty() {
        return if previous == LifecyclePhase::Initializing {
            LifecyclePhase::Initializing
        } else {
            LifecyclePhase::NotExists
        };
    }
    let expected_followers = u64::from(desired_leaders).checked_mul(u64::from(desired_followers_per_leader));
    let leaders_match = leaders.len() as u64 == u64::from(desired_leaders);
    let followers_match = expected_followers == Some(followers.len() as u64);
    if leaders_match && followers_match {
        LifecyclePhase::Ready
    } else {
        LifecyclePhase::Unknown
    }
}

/// [`classify`] with counts taken from a topology.
pub fn classify_topology(
    topology: &DesiredTopology,
    leaders: &WorkloadSnapshot,
    followers: &WorkloadSnapshot,
    previous: LifecyclePhase,
) -> LifecyclePhase {
    classify(topology.leaders(), topology.followers_per_leader(), leaders, followers, previous)
}

/// Last phase written by the bootstrap orchestrator, per cluster, plus which clusters have a
/// bootstrap that started but has not yet completed.
///
/// Breaks the zero-leader ambiguity between "never created" and "created, pods not yet
/// scheduled". Reconciler-process memory only: it is reset on restart. Absent keys read
/// as [`LifecyclePhase::Unknown`].
#[derive(Debug, Default)]
pub struct PhaseLatch {
    state: Mutex<LatchState>,
}

#[derive(Debug, Default)]
struct LatchState {
    phases: HashMap<ClusterKey, LifecyclePhase>,
    unfinished: HashSet<ClusterKey>,
}

impl PhaseLatch {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &ClusterKey) -> LifecyclePhase {
        self.state().phases.get(key).copied().unwrap_or_default()
    }

    /// Records `phase` for `key`, returning the previous value.
    pub fn set(&self, key: &ClusterKey, phase: LifecyclePhase) -> LifecyclePhase {
        let prev = self.state().phases.insert(key.clone(), phase).unwrap_or_default();
        if prev != phase {
            info!(cluster = %key, from = %prev, to = %phase, "phase latch updated");
        }
        prev
    }

    /// Marks a bootstrap for `key` as started. It stays unfinished until
    /// [`PhaseLatch::finish_bootstrap`] is called.
    pub fn begin_bootstrap(&self, key: &ClusterKey) {
        self.state().unfinished.insert(key.clone());
    }

    pub fn finish_bootstrap(&self, key: &ClusterKey) {
        if self.state().unfinished.remove(key) {
            debug!(cluster = %key, "bootstrap completed");
        }
    }

    /// True while a bootstrap for `key` failed, was cancelled, or is still running.
    pub fn bootstrap_unfinished(&self, key: &ClusterKey) -> bool {
        self.state().unfinished.contains(key)
    }

    /// Drops everything recorded for a cluster that no longer exists.
    pub fn forget(&self, key: &ClusterKey) {
        let mut st = self.state();
        let had_phase = st.phases.remove(key).is_some();
        let had_marker = st.unfinished.remove(key);
        if had_phase || had_marker {
            debug!(cluster = %key, "phase latch entry dropped");
        }
    }

    /// Number of clusters with a recorded phase.
    pub fn len(&self) -> usize {
        self.state().phases.len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
