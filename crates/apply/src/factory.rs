//! Deterministic derivation of every resource a cluster needs.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, Namespace, Pod, PodSpec, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use redkeep_core::{DesiredTopology, ResourceSpec, SpecError, LABEL_APP, LABEL_ROLE};

pub const LABEL_LEADER_INDEX: &str = "redis-leader-index";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "redkeep";

const CONFIG_KEY: &str = "redis.conf";
const CONFIG_DIR: &str = "/etc/redis";
const CLUSTER_BUS_OFFSET: i32 = 10_000;
const MAX_CLIENT_PORT: i32 = 65_535 - CLUSTER_BUS_OFFSET;
const MAX_LABEL_LEN: usize = 63;

/// Per-cluster inputs that are not part of the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTemplate {
    /// Base name every derived object is named after.
    pub name: String,
    pub image: String,
    pub port: i32,
    pub redis_config: BTreeMap<String, String>,
    pub owner: Option<OwnerReference>,
}

impl ClusterTemplate {
    pub fn new(name: impl Into<String>, image: impl Into<String>, port: i32) -> Self {
        Self { name: name.into(), image: image.into(), port, redis_config: BTreeMap::new(), owner: None }
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// RFC 1123 label check: at most 63 lowercase alphanumerics or '-', alphanumeric at both ends.
pub fn validate_label(name: &str) -> Result<(), SpecError> {
    let invalid = |reason| Err(SpecError::InvalidName { name: name.to_string(), reason });
    if name.is_empty() {
        return invalid("empty");
    }
    if name.len() > MAX_LABEL_LEN {
        return invalid("longer than 63 characters");
    }
    if !name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-') {
        return invalid("only lowercase alphanumerics and '-' are allowed");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("must start and end with an alphanumeric character");
    }
    Ok(())
}

/// Builds [`ResourceSpec`]s for one cluster. Stateless; every call derives afresh.
pub struct ResourceFactory<'a> {
    topology: &'a DesiredTopology,
    template: &'a ClusterTemplate,
}

impl<'a> ResourceFactory<'a> {
    pub fn new(topology: &'a DesiredTopology, template: &'a ClusterTemplate) -> Self {
        Self { topology, template }
    }

    pub fn config_name(&self) -> String {
        format!("{}-config", self.template.name)
    }

    pub fn service_name(&self) -> String {
        self.template.name.clone()
    }

    pub fn headless_service_name(&self) -> String {
        format!("{}-headless", self.template.name)
    }

    pub fn leader_name(&self, index: u32) -> String {
        format!("{}-leader-{}", self.template.name, index)
    }

    fn meta(&self, name: String, labels: BTreeMap<String, String>) -> Result<ObjectMeta, SpecError> {
        validate_label(&name)?;
        Ok(ObjectMeta {
            name: Some(name),
            namespace: Some(self.topology.namespace().to_string()),
            labels: Some(labels),
            owner_references: self.template.owner.clone().map(|o| vec![o]),
            ..Default::default()
        })
    }

    fn base_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), self.topology.app().to_string());
        labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
        labels
    }

    fn app_selector(&self) -> BTreeMap<String, String> {
        [(LABEL_APP.to_string(), self.topology.app().to_string())].into_iter().collect()
    }

    /// Client and cluster-bus ports. Both must be valid TCP ports.
    fn ports(&self) -> Result<(i32, i32), SpecError> {
        let port = self.template.port;
        if !(1..=MAX_CLIENT_PORT).contains(&port) {
            return Err(SpecError::InvalidPort { port, max: MAX_CLIENT_PORT });
        }
        Ok((port, port + CLUSTER_BUS_OFFSET))
    }

    pub fn namespace(&self) -> Result<ResourceSpec, SpecError> {
        let name = self.topology.namespace().to_string();
        validate_label(&name)?;
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
        Ok(ResourceSpec::Namespace(Namespace {
            metadata: ObjectMeta { name: Some(name), labels: Some(labels), ..Default::default() },
            ..Default::default()
        }))
    }

    /// Renders `redis.conf`: cluster-mode defaults first, then extra directives by key.
    pub fn redis_conf(&self) -> String {
        let mut lines = vec![
            "cluster-enabled yes".to_string(),
            format!("port {}", self.template.port),
            "cluster-config-file nodes.conf".to_string(),
            "cluster-node-timeout 5000".to_string(),
            "appendonly yes".to_string(),
        ];
        for (k, v) in &self.template.redis_config {
            lines.push(format!("{} {}", k, v));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    pub fn config(&self) -> Result<ResourceSpec, SpecError> {
        self.ports()?;
        let metadata = self.meta(self.config_name(), self.base_labels())?;
        let data = [(CONFIG_KEY.to_string(), self.redis_conf())].into_iter().collect();
        Ok(ResourceSpec::Config(ConfigMap { metadata, data: Some(data), ..Default::default() }))
    }

    pub fn service(&self) -> Result<ResourceSpec, SpecError> {
        let (port, _) = self.ports()?;
        let metadata = self.meta(self.service_name(), self.base_labels())?;
        let spec = ServiceSpec {
            selector: Some(self.app_selector()),
            ports: Some(vec![self.service_port("redis", port)]),
            ..Default::default()
        };
        Ok(ResourceSpec::Service(Service { metadata, spec: Some(spec), ..Default::default() }))
    }

    pub fn headless_service(&self) -> Result<ResourceSpec, SpecError> {
        let (port, bus) = self.ports()?;
        let metadata = self.meta(self.headless_service_name(), self.base_labels())?;
        let spec = ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(self.app_selector()),
            publish_not_ready_addresses: Some(true),
            ports: Some(vec![
                self.service_port("redis", port),
                self.service_port("cluster-bus", bus),
            ]),
            ..Default::default()
        };
        Ok(ResourceSpec::HeadlessService(Service { metadata, spec: Some(spec), ..Default::default() }))
    }

    fn service_port(&self, name: &str, port: i32) -> ServicePort {
        ServicePort {
            name: Some(name.to_string()),
            port,
            target_port: Some(IntOrString::Int(port)),
            ..Default::default()
        }
    }

    /// Leader pod `index`. Fails for indices outside the desired leader count or when the
    /// derived name is not a valid host label.
    pub fn leader(&self, index: u32) -> Result<ResourceSpec, SpecError> {
        if index >= self.topology.leaders() {
            return Err(SpecError::IndexOutOfRange { index, leaders: self.topology.leaders() });
        }
        let (port, bus) = self.ports()?;
        let name = self.leader_name(index);
        let mut labels = self.base_labels();
        labels.insert(LABEL_ROLE.to_string(), "leader".to_string());
        labels.insert(LABEL_LEADER_INDEX.to_string(), index.to_string());
        let metadata = self.meta(name.clone(), labels)?;

        let container = Container {
            name: "redis".to_string(),
            image: Some(self.template.image.clone()),
            command: Some(vec!["redis-server".to_string(), format!("{}/{}", CONFIG_DIR, CONFIG_KEY)]),
            ports: Some(vec![
                ContainerPort { name: Some("redis".into()), container_port: port, ..Default::default() },
                ContainerPort { name: Some("cluster-bus".into()), container_port: bus, ..Default::default() },
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: "config".to_string(),
                mount_path: CONFIG_DIR.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let spec = PodSpec {
            hostname: Some(name),
            subdomain: Some(self.headless_service_name()),
            containers: vec![container],
            volumes: Some(vec![Volume {
                name: "config".to_string(),
                config_map: Some(ConfigMapVolumeSource { name: Some(self.config_name()), ..Default::default() }),
                ..Default::default()
            }]),
            ..Default::default()
        };
        Ok(ResourceSpec::LeaderPod { index, pod: Box::new(Pod { metadata, spec: Some(spec), ..Default::default() }) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redkeep_core::ResourceKind;

    fn topology(leaders: u32) -> DesiredTopology {
        DesiredTopology::new("prod", "cache", leaders, 1).unwrap()
    }

    #[test]
    fn names_follow_base_name() {
        let t = topology(3);
        let tpl = ClusterTemplate::new("orders", "redis:7.2", 6379);
        let f = ResourceFactory::new(&t, &tpl);
        assert_eq!(f.config().unwrap().name(), "orders-config");
        assert_eq!(f.service().unwrap().name(), "orders");
        assert_eq!(f.headless_service().unwrap().name(), "orders-headless");
        assert_eq!(f.leader(2).unwrap().name(), "orders-leader-2");
        assert_eq!(f.leader(2).unwrap().namespace(), Some("prod"));
        assert_eq!(f.namespace().unwrap().namespace(), None);
    }

    #[test]
    fn derivation_is_deterministic() {
        let t = topology(3);
        let tpl = ClusterTemplate::new("orders", "redis:7.2", 6379);
        let f = ResourceFactory::new(&t, &tpl);
        assert_eq!(f.leader(1).unwrap(), f.leader(1).unwrap());
        assert_eq!(f.config().unwrap(), f.config().unwrap());
    }

    #[test]
    fn leader_labels_match_the_leader_selector() {
        let t = topology(3);
        let tpl = ClusterTemplate::new("orders", "redis:7.2", 6379);
        let spec = ResourceFactory::new(&t, &tpl).leader(0).unwrap();
        assert_eq!(spec.kind(), ResourceKind::LeaderPod);
        let labels = spec.metadata().labels.clone().unwrap();
        let sel = t.selector(redkeep_core::NodeRole::Leader);
        assert!(sel.matches(labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))));
        assert_eq!(labels.get(LABEL_LEADER_INDEX).map(String::as_str), Some("0"));
    }

    #[test]
    fn headless_service_exposes_client_and_bus_ports() {
        let t = topology(1);
        let tpl = ClusterTemplate::new("orders", "redis:7.2", 7000);
        let spec = ResourceFactory::new(&t, &tpl).headless_service().unwrap();
        let ResourceSpec::HeadlessService(svc) = spec else { panic!("wrong variant") };
        let svc_spec = svc.spec.unwrap();
        assert_eq!(svc_spec.cluster_ip.as_deref(), Some("None"));
        let ports: Vec<i32> = svc_spec.ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![7000, 17000]);
    }

    #[test]
    fn redis_conf_appends_extra_directives_sorted() {
        let t = topology(1);
        let mut tpl = ClusterTemplate::new("orders", "redis:7.2", 6379);
        tpl.redis_config.insert("maxmemory".into(), "1gb".into());
        tpl.redis_config.insert("appendfsync".into(), "everysec".into());
        let conf = ResourceFactory::new(&t, &tpl).redis_conf();
        assert!(conf.starts_with("cluster-enabled yes\nport 6379\n"));
        assert!(conf.ends_with("appendfsync everysec\nmaxmemory 1gb\n"));
    }

    #[test]
    fn out_of_range_index_and_bad_names_fail() {
        let t = topology(2);
        let tpl = ClusterTemplate::new("orders", "redis:7.2", 6379);
        assert_eq!(ResourceFactory::new(&t, &tpl).leader(2).unwrap_err(), SpecError::IndexOutOfRange { index: 2, leaders: 2 });

        let tpl = ClusterTemplate::new("Orders", "redis:7.2", 6379);
        assert!(matches!(ResourceFactory::new(&t, &tpl).config(), Err(SpecError::InvalidName { .. })));

        let long = "a".repeat(60);
        let tpl = ClusterTemplate::new(long, "redis:7.2", 6379);
        // "<60>-config" is 67 characters.
        assert!(matches!(ResourceFactory::new(&t, &tpl).config(), Err(SpecError::InvalidName { .. })));
    }

    #[test]
    fn ports_without_room_for_the_cluster_bus_are_rejected() {
        let t = topology(1);
        for port in [i32::MAX, 55_536, 0, -1] {
            let tpl = ClusterTemplate::new("orders", "redis:7.2", port);
            let f = ResourceFactory::new(&t, &tpl);
            let want = SpecError::InvalidPort { port, max: 55_535 };
            assert_eq!(f.headless_service().unwrap_err(), want);
            assert_eq!(f.leader(0).unwrap_err(), want);
            assert_eq!(f.service().unwrap_err(), want);
            assert_eq!(f.config().unwrap_err(), want);
        }
        let tpl = ClusterTemplate::new("orders", "redis:7.2", 55_535);
        assert!(ResourceFactory::new(&t, &tpl).headless_service().is_ok());
    }

    #[test]
    fn label_validation_edges() {
        assert!(validate_label("a").is_ok());
        assert!(validate_label(&"a".repeat(63)).is_ok());
        assert!(validate_label(&"a".repeat(64)).is_err());
        assert!(validate_label("-a").is_err());
        assert!(validate_label("a-").is_err());
        assert!(validate_label("a_b").is_err());
        assert!(validate_label("").is_err());
    }
}
