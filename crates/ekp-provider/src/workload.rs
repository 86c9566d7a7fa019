//! The sample applications scaled on adapter-served custom metrics.

use std::collections::BTreeMap;

use ekp_config::consts::{DEFAULT_NAMESPACE, OPENTELEMETRY_NAMESPACE};
use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{k8s, Capability, ResourceId};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec};
use strum::{Display, EnumIter};
use tracing::{debug, instrument, Level};

use crate::{
    consts, ComputeOverlay, EksCluster, Observability, ProvisionError, Provisioner, Registry,
};

/// How an application depends on the telemetry collector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Telemetry {
    None,
    /// Exports when the collector happens to be reachable.
    BestEffort,
    /// Must not start before the collector.
    Required,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Display, EnumIter)]
pub enum SampleApp {
    #[strum(serialize = "sample-metrics-app")]
    Metrics,
    #[strum(serialize = "otel-sample-app")]
    Otel,
    #[strum(serialize = "go-otel-sample-app")]
    GoOtel,
    #[strum(serialize = "java-otel-sample-app")]
    JavaOtel,
}

/// `(path, port, initial delay, period)`
type ProbeSpec = (&'static str, i32, i32, i32);

impl SampleApp {
    /// Kubernetes name, which is also the image repository name.
    pub fn name(&self) -> String {
        self.to_string()
    }

    pub const fn construct(&self) -> &'static str {
        match self {
            Self::Metrics => "SampleMetricsApp",
            Self::Otel => "OtelSampleApp",
            Self::GoOtel => "GoOtelSampleApp",
            Self::JavaOtel => "JavaOtelSampleApp",
        }
    }

    pub const fn telemetry(&self) -> Telemetry {
        match self {
            Self::Metrics => Telemetry::None,
            Self::Otel => Telemetry::Required,
            Self::GoOtel | Self::JavaOtel => Telemetry::BestEffort,
        }
    }

    pub const fn replicas(&self) -> i32 {
        2
    }

    /// Named container ports, each exposed one-to-one by the service.
    pub const fn ports(&self) -> &'static [(&'static str, i32)] {
        match self {
            Self::Metrics | Self::Otel => &[("http", 8000), ("metrics", 8080)],
            Self::GoOtel | Self::JavaOtel => &[("http", 8080)],
        }
    }

    /// `(min, max)` replicas.
    pub const fn scaling(&self) -> (i32, i32) {
        match self {
            Self::Metrics => (2, 4),
            Self::Otel => (2, 3),
            Self::GoOtel => (2, 6),
            Self::JavaOtel => (1, 4),
        }
    }

    /// The custom metric the autoscaler targets and its average value.
    pub const fn metric(&self) -> (&'static str, &'static str) {
        match self {
            Self::Metrics => ("sample_app_requests_rate", "10"),
            Self::Otel => ("pod_cpu_utilization", "50"),
            Self::GoOtel => ("go_app_requests_rate", "10"),
            Self::JavaOtel => ("java_app_requests_rate", "10"),
        }
    }

    /// Requests and limits: `((cpu, memory), (cpu, memory))`.
    const fn resources(&self) -> ((&'static str, &'static str), (&'static str, &'static str)) {
        match self {
            Self::Metrics | Self::Otel => (("100m", "128Mi"), ("200m", "256Mi")),
            Self::GoOtel => (("50m", "64Mi"), ("100m", "128Mi")),
            Self::JavaOtel => (("200m", "256Mi"), ("400m", "512Mi")),
        }
    }

    /// Readiness and liveness probes.
    const fn probes(&self) -> Option<(ProbeSpec, ProbeSpec)> {
        match self {
            Self::Metrics => None,
            Self::Otel => Some((("/health", 8000, 10, 5), ("/health", 8000, 15, 10))),
            Self::GoOtel => Some((("/health", 8080, 5, 5), ("/health", 8080, 30, 10))),
            Self::JavaOtel => Some((("/health", 8080, 30, 10), ("/health", 8080, 60, 15))),
        }
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        let path = match self {
            Self::JavaOtel => "/actuator/prometheus",
            _ => "/metrics",
        };
        let mut annotations: BTreeMap<String, String> = [
            ("prometheus.io/scrape", "true"),
            ("prometheus.io/port", "8080"),
            ("prometheus.io/path", path),
        ]
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect();

        match self {
            Self::Otel => {
                annotations.insert("prometheus.io/scheme".into(), "http".into());
                annotations.insert("container.insights/collect".into(), "true".into());
            }
            Self::JavaOtel => {
                annotations.insert("prometheus.io/scheme".into(), "http".into());
            }
            Self::Metrics | Self::GoOtel => {}
        }
        annotations
    }
}

/// Values an application's environment is rendered from.
pub struct WorkloadContext<'a> {
    pub cluster_name: &'a str,
    pub region: &'a str,
    pub workspace_id: String,
}

impl SampleApp {
    fn env(&self, context: &WorkloadContext<'_>) -> Vec<EnvVar> {
        let region = context.region;
        let collector = consts::collector_endpoint(OPENTELEMETRY_NAMESPACE);

        match self {
            Self::Metrics => Vec::default(),
            Self::Otel => vec![
                k8s::env("AWS_REGION", region),
                k8s::env("OTEL_SERVICE_NAME", "otel_sample_app"),
                k8s::env("OTEL_EXPORTER_OTLP_ENDPOINT", collector),
                k8s::env(
                    "OTEL_RESOURCE_ATTRIBUTES",
                    format!(
                        "service.name=otel_sample_app,service.namespace=default,\
                         deployment.environment=test,aws.region={region},\
                         ClusterName={},Namespace=default,PodName=$(HOSTNAME)",
                        context.cluster_name,
                    ),
                ),
                k8s::env("OTEL_METRICS_EXPORTER", "otlp"),
                k8s::env("OTEL_EXPORTER_OTLP_PROTOCOL", "grpc"),
                k8s::env("CLUSTER_NAME", context.cluster_name),
            ],
            Self::GoOtel => {
                // The Go SDK takes a bare host:port
                let endpoint = collector.trim_start_matches("http://");
                vec![
                    k8s::env("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT", endpoint),
                    k8s::env("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT", endpoint),
                    k8s::env("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT", endpoint),
                    k8s::env("AWS_REGION", region),
                    k8s::env("PROMETHEUS_WORKSPACE_ID", context.workspace_id.as_str()),
                    k8s::env("ENVIRONMENT", "production"),
                ]
            }
            Self::JavaOtel => vec![
                k8s::env("OTEL_EXPORTER_OTLP_ENDPOINT", collector.as_str()),
                k8s::env("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT", collector.as_str()),
                k8s::env("OTEL_SERVICE_NAME", "java-otel-sample-app"),
                k8s::env(
                    "OTEL_RESOURCE_ATTRIBUTES",
                    "service.name=java-otel-sample-app,service.version=1.0.0,\
                     deployment.environment=production",
                ),
                k8s::env("OTEL_LOGS_EXPORTER", "otlp"),
                k8s::env("AWS_REGION", region),
                k8s::env("PROMETHEUS_WORKSPACE_ID", context.workspace_id.as_str()),
                k8s::env("ENVIRONMENT", "production"),
            ],
        }
    }

    fn container(&self, image: String, context: &WorkloadContext<'_>) -> Container {
        let (requests, limits) = self.resources();
        let env = self.env(context);
        let (readiness, liveness) = match self.probes() {
            Some((readiness, liveness)) => (Some(readiness), Some(liveness)),
            None => (None, None),
        };
        let probe =
            |(path, port, delay, period): ProbeSpec| k8s::http_probe(path, port, delay, period);

        Container {
            name: self.name(),
            image: Some(image),
            ports: Some(
                self.ports()
                    .iter()
                    .map(|&(name, port)| k8s::container_port(Some(name), port))
                    .collect(),
            ),
            env: Some(env).filter(|env| !env.is_empty()),
            resources: Some(k8s::resource_requirements(requests, limits)),
            readiness_probe: readiness.map(probe),
            liveness_probe: liveness.map(probe),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Workload {
    pub deployment: ResourceId,
    pub service: ResourceId,
    pub autoscaler: ResourceId,
}

/// Deployment, service and autoscaler of one sample application.
pub struct WorkloadProvisioner<'a> {
    pub app: SampleApp,
    pub cluster: &'a EksCluster,
    pub observability: &'a Observability,
    pub overlay: &'a ComputeOverlay,
    pub account: &'a str,
    pub region: &'a str,
    pub cluster_name: &'a str,
}

impl Provisioner for WorkloadProvisioner<'_> {
    type Output = Workload;

    #[instrument(level = Level::INFO, skip_all, fields(app = %self.app), err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let app = self.app;
        let name = app.name();
        let construct = app.construct();
        let scope = self.cluster.stack().child(construct);
        let manifests = self.cluster.manifests(&scope);

        let context = WorkloadContext {
            cluster_name: self.cluster_name,
            region: self.region,
            workspace_id: self.observability.workspace_id(),
        };
        let image = Registry::image(self.account, self.region, &name);

        let mut template = k8s::pod_template(
            k8s::app_labels(&name),
            app.annotations(),
            PodSpec {
                containers: vec![app.container(image, &context)],
                ..Default::default()
            },
        );
        self.overlay.placement.apply(&mut template);

        let mut deployment = manifests.object(
            "Deployment",
            &k8s::deployment(&name, DEFAULT_NAMESPACE, app.replicas(), template),
        )?;
        if app.telemetry() == Telemetry::Required {
            deployment = deployment.requiring(Capability::TelemetryCollector);
        }
        let deployment = graph.add(deployment)?;

        let ports: Vec<k8s::PortMapping<'_>> = app
            .ports()
            .iter()
            .map(|&(port_name, port)| (Some(port_name), port, port))
            .collect();
        let service = manifests.add(
            graph,
            "Service",
            &k8s::service(&name, DEFAULT_NAMESPACE, &name, &ports),
        )?;

        let (metric, average_value) = app.metric();
        let autoscaler = manifests.add(
            graph,
            "HPA",
            &k8s::horizontal_pod_autoscaler(
                &format!("{name}-hpa"),
                DEFAULT_NAMESPACE,
                &name,
                app.scaling(),
                &k8s::PodsMetric {
                    name: metric.into(),
                    average_value: average_value.into(),
                },
            ),
        )?;
        debug!(%deployment, %autoscaler, metric, "declared workload");

        let http_port = app.ports().first().map_or(8080, |&(_, port)| port);
        graph.output(StackOutput::new(
            consts::STACK_EKS_CLUSTER,
            &format!("{construct}Url"),
            format!("http://{name}.{DEFAULT_NAMESPACE}:{http_port}"),
            format!("In-cluster URL of {name}"),
        ));

        Ok(Workload {
            deployment,
            service,
            autoscaler,
        })
    }
}

#[cfg(test)]
mod tests {
    use ekp_config::ComputeSettings;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::overlay;

    #[test]
    fn every_autoscaler_metric_is_served_by_the_adapter() {
        for settings in [ComputeSettings::default(), ComputeSettings::fargate()] {
            let rules = overlay::branch(&settings).adapter_rules;
            for app in SampleApp::iter() {
                let rule = rules.metric(&app.name()).expect("adapter rule for app");
                assert_eq!(rule.metric, app.metric().0);
            }
        }
    }

    #[test]
    fn only_the_python_otel_app_waits_for_the_collector() {
        let required: Vec<_> = SampleApp::iter()
            .filter(|app| app.telemetry() == Telemetry::Required)
            .collect();
        assert_eq!(required, [SampleApp::Otel]);
    }

    #[test]
    fn go_endpoints_have_no_scheme() {
        let context = WorkloadContext {
            cluster_name: "dev-eks-automode",
            region: "us-west-2",
            workspace_id: "ws-123".into(),
        };
        let env = SampleApp::GoOtel.env(&context);
        let traces = env
            .iter()
            .find(|var| var.name == "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT")
            .and_then(|var| var.value.as_deref());
        assert_eq!(traces, Some("otel-collector.opentelemetry:4317"));
    }
}
