use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{k8s, Capability, DeclaredResource, ResourceId, ResourceKind};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use maplit::btreemap;
use serde_json::json;
use tracing::{instrument, Level};

use crate::{
    consts,
    provisioner::{allow, policy_document, web_identity_trust},
    ComputeOverlay, EksCluster, ProvisionError, Provisioner,
};

pub const NAME: &str = "prometheus-adapter";
pub const CONFIG_MAP: &str = "adapter-config";
pub const CUSTOM_METRICS_GROUP: &str = "custom.metrics.k8s.io";
pub const CUSTOM_METRICS_VERSION: &str = "v1beta1";

const SECURE_PORT: i32 = 6443;

#[derive(Clone, Debug)]
pub struct MetricsAdapter {
    pub service_account: ResourceId,
    pub cluster_role: ResourceId,
    pub cluster_role_binding: ResourceId,
    pub config: ResourceId,
    pub deployment: ResourceId,
    pub service: ResourceId,
    pub api_service: ResourceId,
}

/// Serves `custom.metrics.k8s.io` from the in-cluster Prometheus.
pub struct MetricsAdapterProvisioner<'a> {
    pub cluster: &'a EksCluster,
    pub overlay: &'a ComputeOverlay,
    pub namespace: &'a str,
    pub region: &'a str,
}

impl MetricsAdapterProvisioner<'_> {
    fn container(&self) -> Container {
        Container {
            name: NAME.into(),
            image: Some(consts::PROMETHEUS_ADAPTER_IMAGE.into()),
            args: Some(vec![
                "--cert-dir=/tmp/cert".into(),
                format!("--secure-port={SECURE_PORT}"),
                format!("--prometheus-url={}", consts::prometheus_url(self.namespace)),
                "--config=/etc/adapter/config.yaml".into(),
                "--v=4".into(),
            ]),
            env: Some(vec![
                k8s::env("AWS_REGION", self.region),
                k8s::env("AWS_DEFAULT_REGION", self.region),
            ]),
            ports: Some(vec![k8s::container_port(None, SECURE_PORT)]),
            volume_mounts: Some(vec![k8s::volume_mount("config", "/etc/adapter/")]),
            ..Default::default()
        }
    }
}

impl Provisioner for MetricsAdapterProvisioner<'_> {
    type Output = MetricsAdapter;

    #[instrument(level = Level::INFO, skip_all, fields(mode = %self.overlay.mode), err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let scope = self.cluster.stack().child("PrometheusAdapter");
        let manifests = self.cluster.manifests(&scope);

        let role = graph.add(DeclaredResource::new(
            scope.child("ServiceAccountRole"),
            ResourceKind::IamRole,
            NAME,
            json!({
                "AssumeRolePolicyDocument": web_identity_trust(&self.cluster.oidc_provider),
                "Policies": [{
                    "PolicyName": "AdapterLogs",
                    "PolicyDocument": policy_document(vec![allow(
                        &["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                        &["*"],
                    )]),
                }],
            }),
        ))?;
        let service_account = manifests.add(
            graph,
            "ServiceAccount",
            &k8s::service_account(
                NAME,
                self.namespace,
                btreemap! { consts::ROLE_ARN_ANNOTATION.into() => role.attr("Arn") },
            ),
        )?;

        let read = &["get", "list", "watch"];
        let cluster_role = manifests.add(
            graph,
            "ClusterRole",
            &k8s::cluster_role(
                NAME,
                vec![
                    k8s::policy_rule(&[CUSTOM_METRICS_GROUP], &["*"], &["*"]),
                    k8s::policy_rule(&[""], &["nodes", "pods", "services", "configmaps"], read),
                    k8s::policy_rule(
                        &["authorization.k8s.io"],
                        &["subjectaccessreviews"],
                        &["create"],
                    ),
                    k8s::policy_rule(&["apiregistration.k8s.io"], &["apiservices"], read),
                    k8s::policy_rule(&["authentication.k8s.io"], &["tokenreviews"], &["create"]),
                ],
            ),
        )?;
        let cluster_role_binding = manifests.add(
            graph,
            "ClusterRoleBinding",
            &k8s::cluster_role_binding(NAME, NAME, NAME, self.namespace),
        )?;

        let config = manifests.add(
            graph,
            "Config",
            &k8s::config_map(
                CONFIG_MAP,
                self.namespace,
                btreemap! { "config.yaml".into() => self.overlay.adapter_rules.render() },
            ),
        )?;

        // The adapter tolerates its own taint rather than taking the workload placement
        let template = k8s::pod_template(
            k8s::app_labels(NAME),
            Default::default(),
            PodSpec {
                service_account_name: Some(NAME.into()),
                tolerations: Some(vec![self.overlay.adapter_toleration.clone()]),
                containers: vec![self.container()],
                volumes: Some(vec![k8s::config_map_volume("config", CONFIG_MAP)]),
                ..Default::default()
            },
        );
        let deployment = graph.add(
            manifests
                .object("Deployment", &k8s::deployment(NAME, self.namespace, 1, template))?
                .requiring(Capability::MetricsBackend)
                .providing(Capability::CustomMetrics),
        )?;

        let service = manifests.add(
            graph,
            "Service",
            &k8s::service(NAME, self.namespace, NAME, &[(Some("https"), 443, SECURE_PORT)]),
        )?;

        let api_service = graph.add(
            manifests
                .value(
                    "APIService",
                    k8s::api_service(
                        CUSTOM_METRICS_GROUP,
                        CUSTOM_METRICS_VERSION,
                        NAME,
                        self.namespace,
                    ),
                )?
                .providing(Capability::CustomMetrics),
        )?;

        graph.output(StackOutput::new(
            consts::STACK_EKS_CLUSTER,
            "PrometheusAdapterStatus",
            format!("Prometheus Adapter deployment complete for {} mode", self.overlay.mode),
            format!(
                "Status of the Prometheus Adapter deployment with {} metrics configuration",
                self.overlay.mode,
            ),
        ));

        Ok(MetricsAdapter {
            service_account,
            cluster_role,
            cluster_role_binding,
            config,
            deployment,
            service,
            api_service,
        })
    }
}
