use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TopologyError;

/// Label carrying the logical application identity.
pub const LABEL_APP: &str = "app";

/// Label carrying the node role within the redis topology.
pub const LABEL_ROLE: &str = "redis-node-role";

/// Identity of one cluster resource: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Target shape of a cluster. Immutable for the duration of a reconcile cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredTopology {
    namespace: String,
    app: String,
    leaders: u32,
    followers_per_leader: u32,
}

impl DesiredTopology {
    /// Validates and builds a topology. At least one leader is required.
    pub fn new(
        namespace: impl Into<String>,
        app: impl Into<String>,
        leaders: u32,
        followers_per_leader: u32,
    ) -> Result<Self, TopologyError> {
        let namespace = namespace.into();
        let app = app.into();
        if namespace.is_empty() {
            return Err(TopologyError::EmptyNamespace);
        }
        if app.is_empty() {
            return Err(TopologyError::EmptyApp);
        }
        if leaders == 0 {
            return Err(TopologyError::ZeroLeaders);
        }
        Ok(Self { namespace, app, leaders, followers_per_leader })
    }

    pub fn namespace(&self) -> &str { &self.namespace }
    pub fn app(&self) -> &str { &self.app }
    pub fn leaders(&self) -> u32 { self.leaders }
    pub fn followers_per_leader(&self) -> u32 { self.followers_per_leader }

    /// Total follower count the cluster should converge to, `None` on overflow.
    pub fn expected_followers(&self) -> Option<u64> {
        u64::from(self.leaders).checked_mul(u64::from(self.followers_per_leader))
    }

    pub fn selector(&self, role: NodeRole) -> RoleSelector {
        RoleSelector { namespace: self.namespace.clone(), app: self.app.clone(), role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Leader,
    Follower,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Leader => "leader",
            NodeRole::Follower => "follower",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace-scoped label selector for one role of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSelector {
    pub namespace: String,
    pub app: String,
    pub role: NodeRole,
}

impl RoleSelector {
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), self.app.clone());
        labels.insert(LABEL_ROLE.to_string(), self.role.as_str().to_string());
        labels
    }

    /// Renders the selector in `k=v,k=v` form, keys sorted.
    pub fn to_query(&self) -> String {
        self.labels()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether a label set satisfies this selector.
    pub fn matches<'a, I>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut app_ok = false;
        let mut role_ok = false;
        for (k, v) in labels {
            if k == LABEL_APP && v == self.app { app_ok = true; }
            if k == LABEL_ROLE && v == self.role.as_str() { role_ok = true; }
        }
        app_ok && role_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_rejects_zero_leaders_and_empty_identity() {
        assert_eq!(DesiredTopology::new("ns", "redis", 0, 1).unwrap_err(), TopologyError::ZeroLeaders);
        assert_eq!(DesiredTopology::new("ns", "", 3, 1).unwrap_err(), TopologyError::EmptyApp);
        assert_eq!(DesiredTopology::new("", "redis", 3, 1).unwrap_err(), TopologyError::EmptyNamespace);
        let t = DesiredTopology::new("ns", "redis", 3, 0).expect("zero followers is allowed");
        assert_eq!(t.expected_followers(), Some(0));
    }

    #[test]
    fn selector_query_is_sorted_and_role_specific() {
        let t = DesiredTopology::new("prod", "cache", 3, 1).unwrap();
        assert_eq!(t.selector(NodeRole::Leader).to_query(), "app=cache,redis-node-role=leader");
        assert_eq!(t.selector(NodeRole::Follower).to_query(), "app=cache,redis-node-role=follower");
    }

    #[test]
    fn selector_matching_requires_both_labels() {
        let sel = DesiredTopology::new("prod", "cache", 1, 0).unwrap().selector(NodeRole::Leader);
        assert!(sel.matches([("app", "cache"), ("redis-node-role", "leader"), ("x", "y")]));
        assert!(!sel.matches([("app", "cache"), ("redis-node-role", "follower")]));
        assert!(!sel.matches([("redis-node-role", "leader")]));
    }
}
