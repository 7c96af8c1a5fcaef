//! redkeep core types: desired topology, observed workloads, lifecycle phases.
//!
//! Everything in this crate is pure. Talking to the orchestration platform lives in
//! `redkeep-kubehub`; deriving and applying resources lives in `redkeep-apply`.

#![forbid(unsafe_code)]

mod error;
mod phase;
mod resource;
mod snapshot;
mod topology;

pub use error::{PlatformError, ReconcileError, SpecError, TopologyError};
pub use phase::{classify, classify_topology, LifecyclePhase, PhaseLatch};
pub use resource::{ResourceKind, ResourceSpec};
pub use snapshot::{WorkloadRecord, WorkloadSnapshot};
pub use topology::{ClusterKey, DesiredTopology, NodeRole, RoleSelector, LABEL_APP, LABEL_ROLE};

pub type Uid = [u8; 16];

pub mod prelude {
    pub use super::{
        classify, ClusterKey, DesiredTopology, LifecyclePhase, NodeRole, PhaseLatch, PlatformError,
        ReconcileError, ResourceKind, ResourceSpec, RoleSelector, SpecError, WorkloadRecord,
        WorkloadSnapshot,
    };
}
