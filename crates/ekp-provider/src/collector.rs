use ekp_graph::GraphBuilder;
use ekp_openapi::{k8s, Capability, ResourceId};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use maplit::btreemap;
use tracing::{instrument, Level};

use crate::{
    consts,
    observability::{APPLICATION_LOG_GROUP, OTEL_LOG_GROUP},
    EksCluster, Observability, ProvisionError, Provisioner,
};

pub const SERVICE_ACCOUNT: &str = "otel-collector-sa";
pub const CONFIG_MAP: &str = "otel-collector-conf";
const CLUSTER_ROLE: &str = "otel-collector-role";
const CLUSTER_ROLE_BINDING: &str = "otel-collector-role-binding";
const CONFIG_VOLUME: &str = "otel-collector-config-volume";

const OTLP_HTTP_PORT: i32 = 4318;
const HEALTH_CHECK_PORT: i32 = 13133;
const METRICS_PORT: i32 = 8888;

/// Metrics the collector forwards; everything else is dropped.
const FORWARDED_METRICS: &[&str] = &[
    "pod_cpu_utilization",
    "pod_memory_utilization",
    "pod_network_rx_bytes",
    "pod_network_tx_bytes",
    "pod_cpu_utilization_over_pod_limit",
    "pod_memory_utilization_over_pod_limit",
    "container_cpu_utilization",
    "container_memory_utilization",
    "container_cpu_limit",
    "container_memory_limit",
    "service_number_of_running_pods",
    "otel_sample_app_.*",
];

#[derive(Clone, Debug)]
pub struct Collector {
    pub service_account: ResourceId,
    pub cluster_role: ResourceId,
    pub cluster_role_binding: ResourceId,
    pub config: ResourceId,
    pub deployment: ResourceId,
    pub service: ResourceId,
}

/// The ADOT collector receiving OTLP from the instrumented apps.
pub struct CollectorProvisioner<'a> {
    pub cluster: &'a EksCluster,
    pub observability: &'a Observability,
    pub cluster_name: &'a str,
    pub namespace: &'a str,
    pub region: &'a str,
}

impl CollectorProvisioner<'_> {
    fn config(&self) -> String {
        let region = self.region;
        let cluster_name = self.cluster_name;
        let remote_write = self.observability.remote_write_url(region);
        let forwarded = FORWARDED_METRICS
            .iter()
            .map(|metric| format!("          - {metric}\n"))
            .collect::<String>();
        let grpc = consts::COLLECTOR_OTLP_GRPC_PORT;

        format!(
            r#"receivers:
  otlp:
    protocols:
      grpc:
        endpoint: 0.0.0.0:{grpc}
      http:
        endpoint: 0.0.0.0:{OTLP_HTTP_PORT}
  prometheus:
    config:
      global:
        scrape_interval: 15s
        evaluation_interval: 15s
      scrape_configs:
        - job_name: 'otel-collector'
          static_configs:
            - targets: ['localhost:{METRICS_PORT}']
        - job_name: 'kubernetes-pods'
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

processors:
  batch:
    timeout: 1s
    send_batch_size: 1024
  resource:
    attributes:
      - action: insert
        key: service.namespace
        value: "default"
      - action: insert
        key: deployment.environment
        value: "test"
      - action: insert
        key: ClusterName
        value: "{cluster_name}"
  filter:
    metrics:
      include:
        match_type: regexp
        metric_names:
{forwarded}
exporters:
  awsxray:
    region: {region}
  awsemf:
    region: {region}
    namespace: ContainerInsights
    log_group_name: {OTEL_LOG_GROUP}
    dimension_rollup_option: NoDimensionRollup
    metric_declarations:
      - dimensions: [[ClusterName], [ClusterName, Namespace], [ClusterName, Namespace, PodName]]
        metric_name_selectors:
          - pod_cpu_utilization
          - pod_memory_utilization
      - dimensions: [[service.name, service.namespace]]
        metric_name_selectors:
          - ".*"
    output_destination: logs
  prometheusremotewrite:
    endpoint: {remote_write}
    auth:
      authenticator: sigv4auth
    resource_to_telemetry_conversion:
      enabled: true
    namespace: otel_sample_app
    add_metric_suffixes: false
  debug:
    verbosity: detailed
  awscloudwatchlogs:
    region: {region}
    log_group_name: "{APPLICATION_LOG_GROUP}"
    log_stream_name: "otel-collector-logs"

extensions:
  health_check:
    endpoint: 0.0.0.0:{HEALTH_CHECK_PORT}
  sigv4auth:
    region: {region}
    service: "aps"

service:
  extensions: [health_check, sigv4auth]
  pipelines:
    traces:
      receivers: [otlp]
      processors: [batch, resource]
      exporters: [awsxray, debug]
    metrics:
      receivers: [otlp, prometheus]
      processors: [batch, filter, resource]
      exporters: [prometheusremotewrite, awsemf, debug]
    logs:
      receivers: [otlp]
      processors: [batch, resource]
      exporters: [awscloudwatchlogs, debug]
"#,
        )
    }

    fn container(&self) -> Container {
        Container {
            name: consts::COLLECTOR_SERVICE.into(),
            image: Some(consts::infer_collector_image()),
            command: Some(vec!["/awscollector".into()]),
            args: Some(vec!["--config=/conf/collector.yaml".into()]),
            volume_mounts: Some(vec![k8s::volume_mount(CONFIG_VOLUME, "/conf")]),
            ports: Some(vec![
                k8s::container_port(None, consts::COLLECTOR_OTLP_GRPC_PORT),
                k8s::container_port(None, OTLP_HTTP_PORT),
                k8s::container_port(None, HEALTH_CHECK_PORT),
                k8s::container_port(Some("metrics"), METRICS_PORT),
            ]),
            env: Some(vec![
                k8s::env("AWS_REGION", self.region),
                k8s::env("AWS_STS_REGIONAL_ENDPOINTS", "regional"),
                k8s::env("OTEL_METRICS_EXPORTER", "prometheus"),
                k8s::env(
                    "OTEL_EXPORTER_OTLP_ENDPOINT",
                    format!("http://localhost:{}", consts::COLLECTOR_OTLP_GRPC_PORT),
                ),
                k8s::env("METRICS_EXPOSITION_PORT", METRICS_PORT.to_string()),
                k8s::env("METRICS_EXPOSITION_HOST", "0.0.0.0"),
                k8s::env_from_field("K8S_NODE_NAME", "spec.nodeName"),
                k8s::env_from_field("K8S_POD_NAME", "metadata.name"),
                k8s::env_from_field("K8S_NAMESPACE", "metadata.namespace"),
                k8s::env_from_field("HOST_IP", "status.hostIP"),
                k8s::env_from_field("HOST_NAME", "spec.nodeName"),
                k8s::env("K8S_CLUSTER_NAME", self.cluster_name),
            ]),
            resources: Some(k8s::resource_requirements(("100m", "200Mi"), ("200m", "400Mi"))),
            ..Default::default()
        }
    }
}

impl Provisioner for CollectorProvisioner<'_> {
    type Output = Collector;

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let scope = self.cluster.stack().child("OtelCollector");
        let manifests = self.cluster.manifests(&scope);

        let service_account = manifests.add(
            graph,
            "ServiceAccount",
            &k8s::service_account(
                SERVICE_ACCOUNT,
                self.namespace,
                btreemap! {
                    consts::ROLE_ARN_ANNOTATION.into() => self.cluster.adot_role.attr("Arn"),
                    "eks.amazonaws.com/sts-regional-endpoints".into() => "true".into(),
                },
            ),
        )?;

        let cluster_role = manifests.add(
            graph,
            "ClusterRole",
            &k8s::cluster_role(
                CLUSTER_ROLE,
                vec![k8s::policy_rule(
                    &[""],
                    &["pods", "nodes", "namespaces"],
                    &["get", "watch", "list"],
                )],
            ),
        )?;
        let cluster_role_binding = manifests.add(
            graph,
            "ClusterRoleBinding",
            &k8s::cluster_role_binding(
                CLUSTER_ROLE_BINDING,
                CLUSTER_ROLE,
                SERVICE_ACCOUNT,
                self.namespace,
            ),
        )?;

        let config = manifests.add(
            graph,
            "Config",
            &k8s::config_map(
                CONFIG_MAP,
                self.namespace,
                btreemap! { "collector.yaml".into() => self.config() },
            ),
        )?;

        let template = k8s::pod_template(
            k8s::app_labels(consts::COLLECTOR_SERVICE),
            Default::default(),
            PodSpec {
                service_account_name: Some(SERVICE_ACCOUNT.into()),
                containers: vec![self.container()],
                volumes: Some(vec![k8s::config_map_volume(CONFIG_VOLUME, CONFIG_MAP)]),
                ..Default::default()
            },
        );
        let deployment = graph.add(
            manifests
                .object(
                    "Deployment",
                    &k8s::deployment(consts::COLLECTOR_SERVICE, self.namespace, 1, template),
                )?
                .providing(Capability::TelemetryCollector),
        )?;
        graph.depends_on(&deployment, &cluster_role_binding);

        let service = graph.add(
            manifests
                .object(
                    "Service",
                    &k8s::service(
                        consts::COLLECTOR_SERVICE,
                        self.namespace,
                        consts::COLLECTOR_SERVICE,
                        &[
                            (
                                Some("otlp-grpc"),
                                consts::COLLECTOR_OTLP_GRPC_PORT,
                                consts::COLLECTOR_OTLP_GRPC_PORT,
                            ),
                            (Some("otlp-http"), OTLP_HTTP_PORT, OTLP_HTTP_PORT),
                            (Some("health-check"), HEALTH_CHECK_PORT, HEALTH_CHECK_PORT),
                            (Some("metrics"), METRICS_PORT, METRICS_PORT),
                        ],
                    ),
                )?
                .providing(Capability::TelemetryCollector),
        )?;

        Ok(Collector {
            service_account,
            cluster_role,
            cluster_role_binding,
            config,
            deployment,
            service,
        })
    }
}
