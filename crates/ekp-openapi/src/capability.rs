use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Something a resource makes available to the resources that follow it.
///
/// A resource requiring a capability is ordered after every resource
/// providing it.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum Capability {
    /// The cluster API server accepts manifests.
    KubernetesApi,
    /// Pods can be scheduled (Auto Mode enabled, or Fargate profiles ready).
    ComputeCapacity,
    /// An OTLP endpoint receives traces and metrics.
    TelemetryCollector,
    /// `custom.metrics.k8s.io` is served.
    CustomMetrics,
    /// A Prometheus-compatible query endpoint.
    MetricsBackend,
}
