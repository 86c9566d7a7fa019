use std::collections::{BTreeMap, BTreeSet};

use ekp_openapi::{DeclaredResource, ResourceId};
use serde::Serialize;
use tracing::{debug, instrument, Level};

use crate::{token, DeploymentGraph, EdgeReason, GraphError, RuleTable};

/// A template output, optionally carrying reference tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutput {
    pub stack: String,
    pub name: String,
    pub value: String,
    pub description: String,
}

impl StackOutput {
    pub fn new(
        stack: &str,
        name: &str,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            stack: stack.into(),
            name: name.into(),
            value: value.into(),
            description: description.into(),
        }
    }
}

/// Collects declarations for a single build.
///
/// Populated through `&mut` during declaration and consumed by
/// [`finalize`](Self::finalize).
#[derive(Debug, Default)]
pub struct GraphBuilder {
    resources: BTreeMap<ResourceId, DeclaredResource>,
    explicit: BTreeSet<(ResourceId, ResourceId)>,
    outputs: Vec<StackOutput>,
    rules: RuleTable,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: DeclaredResource) -> Result<ResourceId, GraphError> {
        let id = resource.id.clone();
        if self.resources.contains_key(&id) {
            return Err(GraphError::DuplicateResource { id });
        }

        debug!(id = %id, kind = %resource.kind, "declared resource");
        self.resources.insert(id.clone(), resource);
        Ok(id)
    }

    /// Orders `successor` after `predecessor`.
    ///
    /// Either side may be declared later; unknown ids are reported by
    /// [`finalize`](Self::finalize).
    pub fn depends_on(&mut self, successor: &ResourceId, predecessor: &ResourceId) -> &mut Self {
        self.explicit
            .insert((predecessor.clone(), successor.clone()));
        self
    }

    pub fn output(&mut self, output: StackOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    #[inline]
    pub fn get(&self, id: &ResourceId) -> Option<&DeclaredResource> {
        self.resources.get(id)
    }

    #[inline]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolves every edge and freezes the graph.
    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(resources = self.resources.len()),
        err(Display),
    )]
    pub fn finalize(self) -> Result<DeploymentGraph, GraphError> {
        let Self {
            resources,
            explicit,
            outputs,
            rules,
        } = self;

        let mut edges: BTreeMap<(ResourceId, ResourceId), BTreeSet<EdgeReason>> = BTreeMap::new();

        for (predecessor, successor) in explicit {
            for (resource, dependency) in [(&successor, &predecessor), (&predecessor, &successor)] {
                if !resources.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        resource: resource.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            edges
                .entry((predecessor, successor))
                .or_default()
                .insert(EdgeReason::Explicit);
        }

        for resource in resources.values() {
            let cluster = resource.cluster.iter().map(|cluster| token::Token {
                id: cluster.clone(),
                attribute: "Ref".into(),
            });
            for token in token::scan(&resource.spec).into_iter().chain(cluster) {
                if !resources.contains_key(&token.id) {
                    return Err(GraphError::UnknownReference {
                        resource: resource.id.clone(),
                        reference: token.id,
                    });
                }
                edges
                    .entry((token.id, resource.id.clone()))
                    .or_default()
                    .insert(EdgeReason::Reference {
                        attribute: token.attribute,
                    });
            }
        }

        for output in &outputs {
            if let Some(token) =
                token::scan_str(&output.value).find(|token| !resources.contains_key(&token.id))
            {
                return Err(GraphError::UnknownReference {
                    resource: ResourceId::new(&output.stack).child(&output.name),
                    reference: token.id,
                });
            }
        }

        let declared: Vec<_> = resources.values().collect();
        for (predecessor, successor, rule) in rules.apply(&declared) {
            edges
                .entry((predecessor.id.clone(), successor.id.clone()))
                .or_default()
                .insert(EdgeReason::Rule { name: rule.name });
        }

        DeploymentGraph::new(resources, edges, outputs)
    }
}

#[cfg(test)]
mod tests {
    use ekp_openapi::{k8s, Capability, ResourceKind};
    use serde_json::json;

    use super::*;

    fn cluster_id() -> ResourceId {
        ResourceId::new("EksClusterStack").child("Cluster")
    }

    fn builder() -> GraphBuilder {
        let mut builder = GraphBuilder::new();
        builder
            .add(
                DeclaredResource::new(cluster_id(), ResourceKind::Cluster, "dev", json!({}))
                    .providing(Capability::KubernetesApi)
                    .providing(Capability::ComputeCapacity),
            )
            .unwrap();
        builder
    }

    fn manifest<K: Serialize>(name: &str, object: &K) -> DeclaredResource {
        DeclaredResource::from_object(cluster_id().child(name), object)
            .unwrap()
            .on_cluster(&cluster_id())
    }

    #[test]
    fn autoscaler_declared_first_still_follows_its_deployment() {
        let mut builder = builder();
        let hpa = builder
            .add(manifest(
                "Hpa",
                &k8s::horizontal_pod_autoscaler(
                    "web-hpa",
                    "default",
                    "web",
                    (1, 2),
                    &k8s::PodsMetric {
                        name: "web_requests_rate".into(),
                        average_value: "10".into(),
                    },
                ),
            ))
            .unwrap();
        let service = builder
            .add(manifest(
                "Service",
                &k8s::service("web", "default", "web", &[(None, 80, 8080)]),
            ))
            .unwrap();
        let deployment = builder
            .add(manifest(
                "Deployment",
                &json!({
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": {
                        "name": "web",
                        "namespace": "default",
                        "labels": { "app": "web" },
                    },
                }),
            ))
            .unwrap();

        let graph = builder.finalize().unwrap();
        assert!(graph.has_edge(&deployment, &hpa));
        assert!(graph.has_edge(&deployment, &service));
        assert!(graph.has_edge(&service, &hpa));
        assert!(graph
            .reasons(&deployment, &hpa)
            .unwrap()
            .contains(&EdgeReason::Rule {
                name: "scale-target-before-autoscaler",
            }));
        assert!(graph.has_edge(&cluster_id(), &deployment));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut builder = builder();
        let error = builder
            .add(DeclaredResource::new(
                cluster_id(),
                ResourceKind::Cluster,
                "again",
                json!({}),
            ))
            .unwrap_err();
        assert_eq!(error, GraphError::DuplicateResource { id: cluster_id() });
    }

    #[test]
    fn explicit_edges_to_undeclared_resources_fail() {
        let mut builder = builder();
        let ghost = ResourceId::new("EksClusterStack").child("Ghost");
        builder.depends_on(&cluster_id(), &ghost);

        assert_eq!(
            builder.finalize().unwrap_err(),
            GraphError::UnknownDependency {
                resource: cluster_id(),
                dependency: ghost,
            },
        );
    }

    #[test]
    fn references_to_undeclared_resources_fail() {
        let mut builder = builder();
        let ghost = ResourceId::new("NetworkStack").child("Vpc");
        let role = ResourceId::new("EksClusterStack").child("Role");
        builder
            .add(DeclaredResource::new(
                role.clone(),
                ResourceKind::IamRole,
                "role",
                json!({ "Vpc": ghost.attr("VpcId") }),
            ))
            .unwrap();

        assert_eq!(
            builder.finalize().unwrap_err(),
            GraphError::UnknownReference {
                resource: role,
                reference: ghost,
            },
        );
    }

    #[test]
    fn references_record_the_attribute() {
        let mut builder = builder();
        let profile = builder
            .add(DeclaredResource::new(
                ResourceId::new("EksClusterStack").child("Profile"),
                ResourceKind::FargateProfile,
                "default",
                json!({ "ClusterName": cluster_id().attr("Ref") }),
            ))
            .unwrap();

        let graph = builder.finalize().unwrap();
        assert_eq!(
            graph.reasons(&cluster_id(), &profile),
            Some(&BTreeSet::from([EdgeReason::Reference {
                attribute: "Ref".into(),
            }])),
        );
    }
}
