//! Typed Kubernetes object builders.
//!
//! Every builder returns a `k8s-openapi` object; wrap it with
//! [`DeclaredResource::from_object`](crate::DeclaredResource::from_object).

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        autoscaling::v2::{
            CrossVersionObjectReference, HPAScalingPolicy, HPAScalingRules,
            HorizontalPodAutoscaler, HorizontalPodAutoscalerBehavior, HorizontalPodAutoscalerSpec,
            MetricIdentifier, MetricSpec, MetricTarget, PodsMetricSource,
        },
        core::v1::{
            ConfigMap, ConfigMapVolumeSource, ContainerPort, EmptyDirVolumeSource, EnvVar,
            EnvVarSource, HTTPGetAction, Namespace, ObjectFieldSelector, PodSpec,
            PodTemplateSpec, Probe, ResourceRequirements, Service, ServiceAccount, ServicePort,
            ServiceSpec, Toleration, Volume, VolumeMount,
        },
        rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject},
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};
use maplit::btreemap;
use serde_json::{json, Value};

use crate::consts;

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    btreemap! {
        consts::LABEL_APP.into() => app.into(),
    }
}

pub fn object_meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: namespace.map(Into::into),
        ..Default::default()
    }
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            labels: Some(btreemap! { "name".into() => name.into() }),
            ..object_meta(name, None)
        },
        ..Default::default()
    }
}

pub fn service_account(
    name: &str,
    namespace: &str,
    annotations: BTreeMap<String, String>,
) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            annotations: Some(annotations).filter(|annotations| !annotations.is_empty()),
            ..object_meta(name, Some(namespace))
        },
        ..Default::default()
    }
}

pub fn policy_rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(strings(api_groups)),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

pub fn non_resource_rule(urls: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        non_resource_urls: Some(strings(urls)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

pub fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: object_meta(name, None),
        rules: Some(rules),
        ..Default::default()
    }
}

/// Binds a cluster role to a single service account.
pub fn cluster_role_binding(
    name: &str,
    role: &str,
    service_account: &str,
    namespace: &str,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: object_meta(name, None),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.into(),
            kind: "ClusterRole".into(),
            name: role.into(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".into(),
            name: service_account.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }]),
    }
}

pub fn config_map(name: &str, namespace: &str, data: BTreeMap<String, String>) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(name, Some(namespace)),
        data: Some(data),
        ..Default::default()
    }
}

/// A port exposed by a [`Service`]: `(name, port, target port)`.
pub type PortMapping<'a> = (Option<&'a str>, i32, i32);

pub fn service(name: &str, namespace: &str, app: &str, ports: &[PortMapping<'_>]) -> Service {
    Service {
        metadata: ObjectMeta {
            labels: Some(app_labels(app)),
            ..object_meta(name, Some(namespace))
        },
        spec: Some(ServiceSpec {
            selector: Some(app_labels(app)),
            ports: Some(
                ports
                    .iter()
                    .map(|&(name, port, target_port)| ServicePort {
                        name: name.map(Into::into),
                        port,
                        target_port: Some(IntOrString::Int(target_port)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pod_template(
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    spec: PodSpec,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            annotations: Some(annotations).filter(|annotations| !annotations.is_empty()),
            ..Default::default()
        }),
        spec: Some(spec),
    }
}

/// A deployment selecting its pods by the `app` label.
///
/// The deployment itself is labelled with its own name, which makes it the
/// workload its service and autoscaler belong to.
pub fn deployment(
    name: &str,
    namespace: &str,
    replicas: i32,
    template: PodTemplateSpec,
) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            labels: Some(app_labels(name)),
            ..object_meta(name, Some(namespace))
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(app_labels(name)),
                ..Default::default()
            },
            template,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn container_port(name: Option<&str>, container_port: i32) -> ContainerPort {
    ContainerPort {
        name: name.map(Into::into),
        container_port,
        ..Default::default()
    }
}

/// CPU and memory requests and limits: `(cpu, memory)` each.
pub fn resource_requirements(
    (request_cpu, request_memory): (&str, &str),
    (limit_cpu, limit_memory): (&str, &str),
) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(btreemap! {
            "cpu".into() => Quantity(request_cpu.into()),
            "memory".into() => Quantity(request_memory.into()),
        }),
        limits: Some(btreemap! {
            "cpu".into() => Quantity(limit_cpu.into()),
            "memory".into() => Quantity(limit_memory.into()),
        }),
        ..Default::default()
    }
}

pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub fn env_from_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.into(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn http_probe(path: &str, port: i32, initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.into()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        ..Default::default()
    }
}

pub fn config_map_volume(name: &str, config_map: &str) -> Volume {
    Volume {
        name: name.into(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string().into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.into(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

pub fn volume_mount(name: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: name.into(),
        mount_path: mount_path.into(),
        ..Default::default()
    }
}

/// A `NoSchedule` toleration matching `key=value` exactly.
pub fn toleration(key: &str, value: &str) -> Toleration {
    Toleration {
        key: Some(key.into()),
        operator: Some("Equal".into()),
        value: Some(value.into()),
        effect: Some("NoSchedule".into()),
        ..Default::default()
    }
}

/// A per-pod custom metric an autoscaler keeps at an average value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodsMetric {
    pub name: String,
    pub average_value: String,
}

fn scaling_rules(window: i32, percent: i32, period_seconds: i32) -> HPAScalingRules {
    HPAScalingRules {
        stabilization_window_seconds: Some(window),
        policies: Some(vec![HPAScalingPolicy {
            type_: "Percent".into(),
            value: percent,
            period_seconds,
        }]),
        ..Default::default()
    }
}

pub fn horizontal_pod_autoscaler(
    name: &str,
    namespace: &str,
    deployment: &str,
    (min_replicas, max_replicas): (i32, i32),
    metric: &PodsMetric,
) -> HorizontalPodAutoscaler {
    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            labels: Some(app_labels(deployment)),
            ..object_meta(name, Some(namespace))
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".into()),
                kind: "Deployment".into(),
                name: deployment.into(),
            },
            min_replicas: Some(min_replicas),
            max_replicas,
            metrics: Some(vec![MetricSpec {
                type_: "Pods".into(),
                pods: Some(PodsMetricSource {
                    metric: MetricIdentifier {
                        name: metric.name.clone(),
                        selector: None,
                    },
                    target: MetricTarget {
                        type_: "AverageValue".into(),
                        average_value: Some(Quantity(metric.average_value.clone())),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            behavior: Some(HorizontalPodAutoscalerBehavior {
                scale_up: Some(scaling_rules(60, 100, 15)),
                scale_down: Some(scaling_rules(300, 10, 60)),
            }),
        }),
        ..Default::default()
    }
}

/// `APIService` registration; `kube-aggregator` types are not part of
/// `k8s-openapi`.
pub fn api_service(group: &str, version: &str, service: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "apiregistration.k8s.io/v1",
        "kind": "APIService",
        "metadata": {
            "name": format!("{version}.{group}"),
        },
        "spec": {
            "service": {
                "name": service,
                "namespace": namespace,
            },
            "group": group,
            "version": version,
            "insecureSkipTLSVerify": true,
            "groupPriorityMinimum": 100,
            "versionPriority": 100,
        },
    })
}
