use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{consts, Capability, ResourceError, ResourceId, ResourceKind};

/// A named, typed object the platform declares.
///
/// Cloud resources carry their template properties in `spec`; Kubernetes
/// objects carry the manifest itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredResource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
    /// The cluster a Kubernetes object is applied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ResourceId>,
    pub spec: Value,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub provides: BTreeSet<Capability>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub requires: BTreeSet<Capability>,
}

impl DeclaredResource {
    pub fn new(id: ResourceId, kind: ResourceKind, name: impl Into<String>, spec: Value) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            namespace: None,
            workload: None,
            cluster: None,
            spec,
            provides: BTreeSet::default(),
            requires: BTreeSet::default(),
        }
    }

    /// Wraps a Kubernetes manifest, reading its kind, name, namespace and
    /// `app` label.
    pub fn kubernetes(id: ResourceId, manifest: Value) -> Result<Self, ResourceError> {
        let kind = manifest
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(ResourceError::MissingField { field: "kind" })?;
        let kind = ResourceKind::from_kubernetes_kind(kind).ok_or_else(|| {
            ResourceError::UnsupportedKind {
                kind: kind.to_string(),
            }
        })?;

        let name = manifest
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or(ResourceError::MissingField {
                field: "metadata.name",
            })?
            .to_string();
        let namespace = manifest
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let workload = manifest
            .pointer(&format!("/metadata/labels/{}", consts::LABEL_APP))
            .and_then(Value::as_str)
            .map(ToString::to_string);

        if kind.is_namespaced() && namespace.is_none() {
            return Err(ResourceError::MissingField {
                field: "metadata.namespace",
            });
        }

        Ok(Self {
            namespace,
            workload,
            ..Self::new(id, kind, name, manifest)
        })
    }

    /// Serializes a typed `k8s-openapi` object and wraps it.
    pub fn from_object<K>(id: ResourceId, object: &K) -> Result<Self, ResourceError>
    where
        K: Serialize,
    {
        Self::kubernetes(id, ::serde_json::to_value(object)?)
    }

    #[must_use]
    pub fn on_cluster(mut self, cluster: &ResourceId) -> Self {
        self.cluster = Some(cluster.clone());
        self
    }

    #[must_use]
    pub fn providing(mut self, capability: Capability) -> Self {
        self.provides.insert(capability);
        self
    }

    #[must_use]
    pub fn requiring(mut self, capability: Capability) -> Self {
        self.requires.insert(capability);
        self
    }

    #[inline]
    pub fn stack(&self) -> &str {
        self.id.stack()
    }

    /// Reads a string out of `spec` by JSON pointer.
    pub fn spec_str(&self, pointer: &str) -> Option<&str> {
        self.spec.pointer(pointer).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id() -> ResourceId {
        ResourceId::new("EksClusterStack").child("App")
    }

    #[test]
    fn reads_identity_from_manifest() {
        let resource = DeclaredResource::kubernetes(
            id(),
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {
                    "name": "go-otel-sample-app",
                    "namespace": "default",
                    "labels": { "app": "go-otel-sample-app" },
                },
            }),
        )
        .unwrap();

        assert_eq!(resource.kind, ResourceKind::Deployment);
        assert_eq!(resource.name, "go-otel-sample-app");
        assert_eq!(resource.namespace.as_deref(), Some("default"));
        assert_eq!(resource.workload.as_deref(), Some("go-otel-sample-app"));
    }

    #[test]
    fn namespaced_kinds_need_a_namespace() {
        let error = DeclaredResource::kubernetes(
            id(),
            json!({ "kind": "ConfigMap", "metadata": { "name": "adapter-config" } }),
        )
        .unwrap_err();
        assert!(matches!(error, ResourceError::MissingField { .. }));
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let error = DeclaredResource::kubernetes(
            id(),
            json!({ "kind": "Pod", "metadata": { "name": "debug" } }),
        )
        .unwrap_err();
        assert!(matches!(error, ResourceError::UnsupportedKind { .. }));
    }
}
