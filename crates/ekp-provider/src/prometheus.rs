use ekp_config::MonitoringSettings;
use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{k8s, Capability, DeclaredResource, ResourceId, ResourceKind};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use maplit::btreemap;
use serde_json::json;
use tracing::{instrument, Level};

use crate::{
    consts,
    provisioner::{allow, policy_document, web_identity_trust},
    ComputeOverlay, EksCluster, Observability, ProvisionError, Provisioner,
};

pub const SERVICE_ACCOUNT: &str = "amp-iamproxy-service-account";
pub const DEPLOYMENT: &str = "prometheus-server";
pub const CONFIG_MAP: &str = "prometheus-server-conf";
const CLUSTER_ROLE: &str = "prometheus-cluster-role";
const CLUSTER_ROLE_BINDING: &str = "prometheus-cluster-role-binding";

const CONFIG_VOLUME: &str = "prometheus-config-volume";
const STORAGE_VOLUME: &str = "prometheus-storage-volume";

#[derive(Clone, Debug)]
pub struct Prometheus {
    pub role: ResourceId,
    pub service_account: ResourceId,
    pub cluster_role: ResourceId,
    pub cluster_role_binding: ResourceId,
    pub config: ResourceId,
    pub deployment: ResourceId,
    pub service: ResourceId,
}

/// Prometheus server scraping annotated pods and remote-writing to the
/// managed workspace.
pub struct PrometheusProvisioner<'a> {
    pub settings: &'a MonitoringSettings,
    pub cluster: &'a EksCluster,
    pub observability: &'a Observability,
    pub overlay: &'a ComputeOverlay,
    pub region: &'a str,
}

impl PrometheusProvisioner<'_> {
    fn config(&self) -> String {
        let interval = &self.settings.scrape_interval;
        let region = self.region;
        let remote_write = self.observability.remote_write_url(region);
        format!(
            r"global:
  scrape_interval: {interval}
  evaluation_interval: {interval}

remote_write:
  - url: {remote_write}
    sigv4:
      region: {region}

scrape_configs:
  - job_name: kubernetes-pods
    kubernetes_sd_configs:
      - role: pod
    relabel_configs:
      - source_labels: [__meta_kubernetes_pod_annotation_prometheus_io_scrape]
        action: keep
        regex: true
      - source_labels: [__meta_kubernetes_pod_annotation_prometheus_io_path]
        action: replace
        target_label: __metrics_path__
        regex: (.+)
      - source_labels: [__address__, __meta_kubernetes_pod_annotation_prometheus_io_port]
        action: replace
        regex: ([^:]+)(?::\d+)?;(\d+)
        replacement: $1:$2
        target_label: __address__
      - action: labelmap
        regex: __meta_kubernetes_pod_label_(.+)
      - source_labels: [__meta_kubernetes_namespace]
        action: replace
        target_label: kubernetes_namespace
      - source_labels: [__meta_kubernetes_pod_name]
        action: replace
        target_label: kubernetes_pod_name
",
        )
    }

    fn container(&self) -> Container {
        Container {
            name: "prometheus".into(),
            image: Some(consts::infer_prometheus_image()),
            args: Some(vec![
                "--config.file=/etc/prometheus/prometheus.yml".into(),
                "--storage.tsdb.path=/prometheus/".into(),
                "--web.console.libraries=/usr/share/prometheus/console_libraries".into(),
                "--web.console.templates=/usr/share/prometheus/consoles".into(),
                format!("--web.listen-address=0.0.0.0:{}", consts::PROMETHEUS_PORT),
            ]),
            env: Some(vec![
                k8s::env("AWS_REGION", self.region),
                k8s::env("AWS_DEFAULT_REGION", self.region),
                k8s::env("AWS_STS_REGIONAL_ENDPOINTS", "regional"),
            ]),
            ports: Some(vec![k8s::container_port(None, consts::PROMETHEUS_PORT)]),
            volume_mounts: Some(vec![
                k8s::volume_mount(CONFIG_VOLUME, "/etc/prometheus/"),
                k8s::volume_mount(STORAGE_VOLUME, "/prometheus/"),
            ]),
            ..Default::default()
        }
    }
}

impl Provisioner for PrometheusProvisioner<'_> {
    type Output = Prometheus;

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let scope = self.cluster.stack().child("Prometheus");
        let manifests = self.cluster.manifests(&scope);
        let namespace = self.settings.namespace.as_str();

        let workspace_arn = format!(
            "arn:aws:aps:{}:*:workspace/{}",
            self.region,
            self.observability.workspace_id(),
        );
        let role = graph.add(DeclaredResource::new(
            scope.child("AmpIamProxyRole"),
            ResourceKind::IamRole,
            SERVICE_ACCOUNT,
            json!({
                "AssumeRolePolicyDocument": web_identity_trust(&self.cluster.oidc_provider),
                "Policies": [{
                    "PolicyName": "AmpRemoteWrite",
                    "PolicyDocument": policy_document(vec![allow(
                        &[
                            "aps:RemoteWrite",
                            "aps:QueryMetrics",
                            "aps:GetSeries",
                            "aps:GetLabels",
                            "aps:GetMetricMetadata",
                            "sts:AssumeRoleWithWebIdentity",
                        ],
                        &[workspace_arn.as_str()],
                    )]),
                }],
            }),
        ))?;

        let service_account = manifests.add(
            graph,
            "ServiceAccount",
            &k8s::service_account(
                SERVICE_ACCOUNT,
                namespace,
                btreemap! { consts::ROLE_ARN_ANNOTATION.into() => role.attr("Arn") },
            ),
        )?;

        let read = &["get", "list", "watch"];
        let cluster_role = manifests.add(
            graph,
            "ClusterRole",
            &k8s::cluster_role(
                CLUSTER_ROLE,
                vec![
                    k8s::policy_rule(
                        &[""],
                        &["nodes", "nodes/proxy", "services", "endpoints", "pods"],
                        read,
                    ),
                    k8s::policy_rule(&["extensions", "networking.k8s.io"], &["ingresses"], read),
                    k8s::policy_rule(&[""], &["configmaps"], read),
                    k8s::non_resource_rule(&["/metrics"], &["get"]),
                    k8s::policy_rule(
                        &["authorization.k8s.io"],
                        &["subjectaccessreviews"],
                        &["create"],
                    ),
                ],
            ),
        )?;
        let cluster_role_binding = manifests.add(
            graph,
            "ClusterRoleBinding",
            &k8s::cluster_role_binding(
                CLUSTER_ROLE_BINDING,
                CLUSTER_ROLE,
                SERVICE_ACCOUNT,
                namespace,
            ),
        )?;

        let config = manifests.add(
            graph,
            "ConfigMap",
            &k8s::config_map(
                CONFIG_MAP,
                namespace,
                btreemap! { "prometheus.yml".into() => self.config() },
            ),
        )?;

        let mut template = k8s::pod_template(
            k8s::app_labels(DEPLOYMENT),
            Default::default(),
            PodSpec {
                service_account_name: Some(SERVICE_ACCOUNT.into()),
                dns_policy: Some("ClusterFirst".into()),
                containers: vec![self.container()],
                volumes: Some(vec![
                    k8s::config_map_volume(CONFIG_VOLUME, CONFIG_MAP),
                    k8s::empty_dir_volume(STORAGE_VOLUME),
                ]),
                ..Default::default()
            },
        );
        self.overlay.placement.apply(&mut template);

        let deployment = graph.add(
            manifests
                .object("Deployment", &k8s::deployment(DEPLOYMENT, namespace, 1, template))?
                .providing(Capability::MetricsBackend),
        )?;
        // Scraping needs the binding in place before the first pod starts
        graph.depends_on(&deployment, &cluster_role_binding);

        let service = manifests.add(
            graph,
            "Service",
            &k8s::service(
                consts::PROMETHEUS_SERVICE,
                namespace,
                DEPLOYMENT,
                &[(None, consts::PROMETHEUS_PORT, consts::PROMETHEUS_PORT)],
            ),
        )?;

        graph.output(StackOutput::new(
            consts::STACK_EKS_CLUSTER,
            "PrometheusServiceName",
            consts::PROMETHEUS_SERVICE,
            "Name of the Prometheus service",
        ));

        Ok(Prometheus {
            role,
            service_account,
            cluster_role,
            cluster_role_binding,
            config,
            deployment,
            service,
        })
    }
}
