mod adapter;
mod cluster;
mod collector;
pub mod consts;
mod error;
mod kubectl;
mod network;
pub mod observability;
pub mod overlay;
mod platform;
mod prometheus;
mod provisioner;
mod registry;
pub mod workload;

pub use self::{
    adapter::{MetricsAdapter, MetricsAdapterProvisioner},
    cluster::{ClusterProvisioner, EksCluster},
    collector::{Collector, CollectorProvisioner},
    error::ProvisionError,
    kubectl::{KubectlLayer, KubectlLayerProvisioner},
    network::{Network, NetworkProvisioner},
    observability::{Observability, ObservabilityProvisioner},
    overlay::{branch, ComputeOverlay},
    platform::{build, declare, Platform},
    prometheus::{Prometheus, PrometheusProvisioner},
    provisioner::Provisioner,
    registry::{Registry, RegistryProvisioner},
    workload::{SampleApp, Workload, WorkloadProvisioner},
};
