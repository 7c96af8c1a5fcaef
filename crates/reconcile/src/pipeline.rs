use std::fmt;

use redkeep_apply::ResourceFactory;
use redkeep_core::{DesiredTopology, ResourceSpec, SpecError};
use serde::{Deserialize, Serialize};

/// One named, idempotent step of a bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootstrapStep {
    Namespace,
    Config,
    Service,
    HeadlessService,
    Leader(u32),
}

impl BootstrapStep {
    /// Derives the resource this step creates.
    pub fn derive(&self, factory: &ResourceFactory<'_>) -> Result<ResourceSpec, SpecError> {
        match *self {
            BootstrapStep::Namespace => factory.namespace(),
            BootstrapStep::Config => factory.config(),
            BootstrapStep::Service => factory.service(),
            BootstrapStep::HeadlessService => factory.headless_service(),
            BootstrapStep::Leader(i) => factory.leader(i),
        }
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapStep::Namespace => f.write_str("namespace"),
            BootstrapStep::Config => f.write_str("config"),
            BootstrapStep::Service => f.write_str("service"),
            BootstrapStep::HeadlessService => f.write_str("headless-service"),
            BootstrapStep::Leader(i) => write!(f, "leader-{}", i),
        }
    }
}

/// Ordered steps for a bootstrap: shared config, then networking, then one step per leader.
/// The namespace step, when enabled, runs first.
pub fn plan(topology: &DesiredTopology, create_namespace: bool) -> Vec<BootstrapStep> {
    let mut steps = Vec::with_capacity(topology.leaders() as usize + 4);
    if create_namespace {
        steps.push(BootstrapStep::Namespace);
    }
    steps.push(BootstrapStep::Config);
    steps.push(BootstrapStep::Service);
    steps.push(BootstrapStep::HeadlessService);
    steps.extend((0..topology.leaders()).map(BootstrapStep::Leader));
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_orders_shared_resources_before_leaders() {
        let t = DesiredTopology::new("prod", "cache", 3, 1).unwrap();
        assert_eq!(
            plan(&t, false),
            vec![
                BootstrapStep::Config,
                BootstrapStep::Service,
                BootstrapStep::HeadlessService,
                BootstrapStep::Leader(0),
                BootstrapStep::Leader(1),
                BootstrapStep::Leader(2),
            ]
        );
        assert_eq!(plan(&t, true)[0], BootstrapStep::Namespace);
        assert_eq!(plan(&t, true).len(), 7);
    }

    #[test]
    fn step_names_render_for_logs() {
        assert_eq!(BootstrapStep::Leader(4).to_string(), "leader-4");
        assert_eq!(BootstrapStep::HeadlessService.to_string(), "headless-service");
    }
}
