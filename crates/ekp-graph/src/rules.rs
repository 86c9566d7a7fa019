//! Ordering rules applied uniformly to every declared resource.
//!
//! Each row orders a predecessor kind before a successor kind whenever the
//! row's [`Relation`] holds between two resources. Rows never look at
//! declaration order, so a successor declared first is still ordered after
//! its predecessor.

use std::{collections::BTreeSet, fmt};

use ekp_openapi::{Capability, DeclaredResource, ResourceKind};
use serde_json::Value;

/// Metric types served through an aggregated metrics API.
const CUSTOM_METRIC_TYPES: &[&str] = &["Pods", "Object", "External"];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    /// The predecessor is the namespace the successor lives in.
    NamespaceOf,
    /// The successor binding's `roleRef` names the predecessor.
    RoleRef,
    /// The successor runs as, or binds, the predecessor service account.
    ServiceAccountOf,
    /// The successor mounts the predecessor config map as a volume.
    ConfigMapVolumeOf,
    /// Both belong to the same workload in the same namespace.
    SameWorkload,
    /// The successor autoscaler's `scaleTargetRef` names the predecessor.
    ScaleTarget,
    /// The successor API service is backed by the predecessor service.
    ApiServiceBackend,
    /// The predecessor provides a capability the successor requires.
    Capability(Capability),
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamespaceOf => f.write_str("NamespaceOf"),
            Self::RoleRef => f.write_str("RoleRef"),
            Self::ServiceAccountOf => f.write_str("ServiceAccountOf"),
            Self::ConfigMapVolumeOf => f.write_str("ConfigMapVolumeOf"),
            Self::SameWorkload => f.write_str("SameWorkload"),
            Self::ScaleTarget => f.write_str("ScaleTarget"),
            Self::ApiServiceBackend => f.write_str("ApiServiceBackend"),
            Self::Capability(capability) => write!(f, "Capability({capability})"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub name: &'static str,
    /// `None` matches every kind.
    pub predecessor: Option<ResourceKind>,
    pub successor: Option<ResourceKind>,
    pub relation: Relation,
}

impl Rule {
    pub fn matches(&self, predecessor: &DeclaredResource, successor: &DeclaredResource) -> bool {
        self.predecessor.is_none_or(|kind| kind == predecessor.kind)
            && self.successor.is_none_or(|kind| kind == successor.kind)
            && predecessor.id != successor.id
            && self.relation.holds(predecessor, successor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The ordering rules every platform build is checked against.
    pub fn standard() -> Self {
        use ekp_openapi::{Capability as C, ResourceKind as K};
        use Relation as R;

        const fn rule(
            name: &'static str,
            predecessor: Option<K>,
            successor: Option<K>,
            relation: R,
        ) -> Rule {
            Rule {
                name,
                predecessor,
                successor,
                relation,
            }
        }

        Self::new(vec![
            rule("namespace-before-scoped-object", Some(K::Namespace), None, R::NamespaceOf),
            rule(
                "cluster-role-before-binding",
                Some(K::ClusterRole),
                Some(K::ClusterRoleBinding),
                R::RoleRef,
            ),
            rule(
                "service-account-before-deployment",
                Some(K::ServiceAccount),
                Some(K::Deployment),
                R::ServiceAccountOf,
            ),
            rule(
                "service-account-before-binding",
                Some(K::ServiceAccount),
                Some(K::ClusterRoleBinding),
                R::ServiceAccountOf,
            ),
            rule(
                "config-map-before-deployment",
                Some(K::ConfigMap),
                Some(K::Deployment),
                R::ConfigMapVolumeOf,
            ),
            rule(
                "collector-before-instrumented-app",
                None,
                Some(K::Deployment),
                R::Capability(C::TelemetryCollector),
            ),
            rule(
                "custom-metrics-before-autoscaler",
                None,
                Some(K::HorizontalPodAutoscaler),
                R::Capability(C::CustomMetrics),
            ),
            rule(
                "compute-before-scheduling",
                None,
                None,
                R::Capability(C::ComputeCapacity),
            ),
            rule(
                "deployment-before-service",
                Some(K::Deployment),
                Some(K::Service),
                R::SameWorkload,
            ),
            rule(
                "service-before-autoscaler",
                Some(K::Service),
                Some(K::HorizontalPodAutoscaler),
                R::SameWorkload,
            ),
            rule(
                "scale-target-before-autoscaler",
                Some(K::Deployment),
                Some(K::HorizontalPodAutoscaler),
                R::ScaleTarget,
            ),
            rule(
                "cluster-before-manifest",
                None,
                None,
                R::Capability(C::KubernetesApi),
            ),
            rule(
                "metrics-backend-before-adapter",
                None,
                Some(K::Deployment),
                R::Capability(C::MetricsBackend),
            ),
            rule(
                "service-before-api-service",
                Some(K::Service),
                Some(K::ApiService),
                R::ApiServiceBackend,
            ),
        ])
    }

    /// Every `(predecessor, successor, rule)` triple the table produces.
    pub fn apply<'a>(
        &'a self,
        resources: &'a [&'a DeclaredResource],
    ) -> impl Iterator<Item = (&'a DeclaredResource, &'a DeclaredResource, &'a Rule)> + 'a {
        self.rules.iter().flat_map(move |rule| {
            resources.iter().flat_map(move |&predecessor| {
                resources
                    .iter()
                    .filter(move |&&successor| rule.matches(predecessor, successor))
                    .map(move |&successor| (predecessor, successor, rule))
            })
        })
    }
}

impl Relation {
    pub fn holds(&self, predecessor: &DeclaredResource, successor: &DeclaredResource) -> bool {
        let same_namespace = || {
            predecessor.namespace.is_some() && predecessor.namespace == successor.namespace
        };

        match self {
            Self::NamespaceOf => {
                predecessor.kind == ResourceKind::Namespace
                    && successor.kind.is_namespaced()
                    && successor.namespace.as_deref() == Some(predecessor.name.as_str())
            }
            Self::RoleRef => successor.spec_str("/roleRef/name") == Some(predecessor.name.as_str()),
            Self::ServiceAccountOf => match successor.kind {
                ResourceKind::Deployment => {
                    same_namespace()
                        && successor.spec_str("/spec/template/spec/serviceAccountName")
                            == Some(predecessor.name.as_str())
                }
                ResourceKind::ClusterRoleBinding => array(&successor.spec, "/subjects").any(
                    |subject| {
                        subject.get("kind").and_then(Value::as_str) == Some("ServiceAccount")
                            && subject.get("name").and_then(Value::as_str)
                                == Some(predecessor.name.as_str())
                            && subject.get("namespace").and_then(Value::as_str)
                                == predecessor.namespace.as_deref()
                    },
                ),
                _ => false,
            },
            Self::ConfigMapVolumeOf => {
                same_namespace()
                    && array(&successor.spec, "/spec/template/spec/volumes").any(|volume| {
                        volume.pointer("/configMap/name").and_then(Value::as_str)
                            == Some(predecessor.name.as_str())
                    })
            }
            Self::SameWorkload => {
                same_namespace()
                    && predecessor.workload.is_some()
                    && predecessor.workload == successor.workload
            }
            Self::ScaleTarget => {
                same_namespace()
                    && successor.spec_str("/spec/scaleTargetRef/kind")
                        == predecessor.kind.kubernetes_kind()
                    && successor.spec_str("/spec/scaleTargetRef/name")
                        == Some(predecessor.name.as_str())
            }
            Self::ApiServiceBackend => {
                successor.spec_str("/spec/service/name") == Some(predecessor.name.as_str())
                    && successor.spec_str("/spec/service/namespace")
                        == predecessor.namespace.as_deref()
            }
            Self::Capability(capability) => {
                predecessor.provides.contains(capability)
                    && !successor.provides.contains(capability)
                    && requirements(successor).contains(capability)
            }
        }
    }
}

/// Declared requirements plus the ones implied by the resource itself.
pub fn requirements(resource: &DeclaredResource) -> BTreeSet<Capability> {
    let mut requires = resource.requires.clone();
    if resource.kind.is_kubernetes() {
        requires.insert(Capability::KubernetesApi);
    }
    match resource.kind {
        ResourceKind::Deployment | ResourceKind::ClusterAddon => {
            requires.insert(Capability::ComputeCapacity);
        }
        ResourceKind::HorizontalPodAutoscaler if uses_custom_metrics(resource) => {
            requires.insert(Capability::CustomMetrics);
        }
        _ => {}
    }
    requires
}

fn uses_custom_metrics(resource: &DeclaredResource) -> bool {
    array(&resource.spec, "/spec/metrics").any(|metric| {
        metric
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| CUSTOM_METRIC_TYPES.contains(&kind))
    })
}

fn array<'a>(value: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}
