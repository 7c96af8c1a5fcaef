//! Install bundle: the multi-document manifest the operator ships as.
//!
//! Documents are matched by strict position, not by kind lookup, so a reordered or
//! truncated bundle is rejected instead of half-understood.

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use serde::Deserialize;
use serde_json::Value as Json;

/// Kinds in the order they must appear.
pub const BUNDLE_ORDER: [&str; 7] = [
    "Namespace",
    "CustomResourceDefinition",
    "Role",
    "ClusterRole",
    "RoleBinding",
    "ClusterRoleBinding",
    "Deployment",
];

/// Default bundle size limit: 1 MiB.
pub const DEFAULT_MAX_YAML_BYTES: usize = 1 << 20;

fn max_yaml_bytes() -> usize {
    std::env::var("REDKEEP_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_YAML_BYTES)
}

#[derive(Debug, Clone)]
pub struct InstallBundle {
    pub namespace: Namespace,
    pub crd: CustomResourceDefinition,
    pub role: Role,
    pub cluster_role: ClusterRole,
    pub role_binding: RoleBinding,
    pub cluster_role_binding: ClusterRoleBinding,
    pub deployment: Deployment,
}

impl InstallBundle {
    /// `Kind name` per document, in bundle order.
    pub fn summary(&self) -> Vec<String> {
        let names = [
            self.namespace.metadata.name.as_deref(),
            self.crd.metadata.name.as_deref(),
            self.role.metadata.name.as_deref(),
            self.cluster_role.metadata.name.as_deref(),
            self.role_binding.metadata.name.as_deref(),
            self.cluster_role_binding.metadata.name.as_deref(),
            self.deployment.metadata.name.as_deref(),
        ];
        BUNDLE_ORDER
            .iter()
            .zip(names)
            .map(|(kind, name)| format!("{} {}", kind, name.unwrap_or("-")))
            .collect()
    }
}

/// Splits a multi-document YAML stream into non-empty documents, converted to JSON.
pub fn split_documents(yaml: &str) -> Result<Vec<Json>> {
    if yaml.len() > max_yaml_bytes() {
        return Err(anyhow!("YAML payload too large (>{} bytes)", max_yaml_bytes()));
    }
    let mut out = Vec::new();
    for (i, doc) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let val = serde_yaml::Value::deserialize(doc).with_context(|| format!("parsing YAML document {}", i))?;
        if val.is_null() {
            continue;
        }
        out.push(serde_json::to_value(val).with_context(|| format!("converting YAML document {} to JSON", i))?);
    }
    Ok(out)
}

fn typed<T: serde::de::DeserializeOwned>(docs: &[Json], pos: usize) -> Result<T> {
    let expected = BUNDLE_ORDER[pos];
    let doc = &docs[pos];
    let kind = doc.get("kind").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("document {} missing kind", pos))?;
    if kind != expected {
        return Err(anyhow!("document {}: expected {}, found {}", pos, expected, kind));
    }
    serde_json::from_value(doc.clone()).with_context(|| format!("document {}: decoding {}", pos, expected))
}

/// Parses an install bundle. Exactly one document per kind of [`BUNDLE_ORDER`], in order.
pub fn split_bundle(yaml: &str) -> Result<InstallBundle> {
    let docs = split_documents(yaml)?;
    if docs.len() != BUNDLE_ORDER.len() {
        return Err(anyhow!("expected {} documents, found {}", BUNDLE_ORDER.len(), docs.len()));
    }
    Ok(InstallBundle {
        namespace: typed(&docs, 0)?,
        crd: typed(&docs, 1)?,
        role: typed(&docs, 2)?,
        cluster_role: typed(&docs, 3)?,
        role_binding: typed(&docs, 4)?,
        cluster_role_binding: typed(&docs, 5)?,
        deployment: typed(&docs, 6)?,
    })
}
