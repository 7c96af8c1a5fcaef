use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{NodeRole, Uid};

/// One observed compute unit. Only `role` matters to the classifier; the rest is carried
/// for logging and status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub uid: Option<Uid>,
    pub namespace: String,
    pub name: String,
    pub role: NodeRole,
    /// Platform-reported status phase (e.g. `Pending`, `Running`), if any.
    pub status: Option<String>,
    pub labels: SmallVec<[(String, String); 8]>,
}

/// Point-in-time list of workload records fetched with a single role selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    role: NodeRole,
    items: Vec<WorkloadRecord>,
}

impl WorkloadSnapshot {
    pub fn new(role: NodeRole, items: Vec<WorkloadRecord>) -> Self {
        Self { role, items }
    }

    pub fn empty(role: NodeRole) -> Self {
        Self { role, items: Vec::new() }
    }

    pub fn role(&self) -> NodeRole { self.role }
    pub fn items(&self) -> &[WorkloadRecord] { &self.items }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Number of records whose platform status is `Running`.
    pub fn running(&self) -> usize {
        self.items.iter().filter(|r| r.status.as_deref() == Some("Running")).count()
    }
}
