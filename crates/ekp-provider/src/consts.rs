use ekp_core::env::infer_non_empty;

pub const STACK_NETWORK: &str = "NetworkStack";
pub const STACK_KUBECTL_LAYER: &str = "KubectlLayerStack";
pub const STACK_OBSERVABILITY: &str = "ObservabilityStack";
pub const STACK_ECR: &str = "EcrStack";
pub const STACK_EKS_CLUSTER: &str = "EksClusterStack";

pub const ENV_COLLECTOR_IMAGE: &str = "EKP_COLLECTOR_IMAGE";
pub const ENV_PROMETHEUS_IMAGE: &str = "EKP_PROMETHEUS_IMAGE";

pub const COLLECTOR_IMAGE: &str = "public.ecr.aws/aws-observability/aws-otel-collector:v0.43.3";
pub const PROMETHEUS_IMAGE: &str = "prom/prometheus:v2.40.0";
pub const PROMETHEUS_ADAPTER_IMAGE: &str =
    "k8s.gcr.io/prometheus-adapter/prometheus-adapter:v0.12.0";

pub const COMPUTE_TYPE_LABEL: &str = "eks.amazonaws.com/compute-type";
pub const ROLE_ARN_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

pub const PROMETHEUS_SERVICE: &str = "prometheus-service";
pub const PROMETHEUS_PORT: i32 = 9090;

pub const COLLECTOR_SERVICE: &str = "otel-collector";
pub const COLLECTOR_OTLP_GRPC_PORT: i32 = 4317;

pub fn infer_collector_image() -> String {
    infer_non_empty(ENV_COLLECTOR_IMAGE).unwrap_or_else(|| COLLECTOR_IMAGE.into())
}

pub fn infer_prometheus_image() -> String {
    infer_non_empty(ENV_PROMETHEUS_IMAGE).unwrap_or_else(|| PROMETHEUS_IMAGE.into())
}

/// In-cluster address of the Prometheus server the adapter queries.
pub fn prometheus_url(namespace: &str) -> String {
    format!("http://{PROMETHEUS_SERVICE}.{namespace}.svc.cluster.local:{PROMETHEUS_PORT}")
}

/// OTLP/gRPC endpoint of the collector, as seen from other namespaces.
pub fn collector_endpoint(namespace: &str) -> String {
    format!("http://{COLLECTOR_SERVICE}.{namespace}:{COLLECTOR_OTLP_GRPC_PORT}")
}
