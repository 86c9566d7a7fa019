use std::collections::BTreeMap;

use ekp_config::EnvironmentProfile;
use ekp_graph::{DeploymentGraph, GraphBuilder};
use strum::IntoEnumIterator;
use tracing::{info, instrument, Level};

use crate::{
    overlay, ClusterProvisioner, Collector, CollectorProvisioner, ComputeOverlay, EksCluster,
    KubectlLayer, KubectlLayerProvisioner, MetricsAdapter, MetricsAdapterProvisioner, Network,
    NetworkProvisioner, Observability, ObservabilityProvisioner, Prometheus,
    PrometheusProvisioner, ProvisionError, Provisioner, Registry, RegistryProvisioner, SampleApp,
    Workload, WorkloadProvisioner,
};

/// Ids of everything one platform build declared.
#[derive(Clone, Debug)]
pub struct Platform {
    pub overlay: ComputeOverlay,
    pub network: Network,
    pub kubectl: KubectlLayer,
    pub observability: Observability,
    pub registry: Registry,
    pub cluster: EksCluster,
    pub prometheus: Prometheus,
    pub adapter: MetricsAdapter,
    pub collector: Collector,
    pub workloads: BTreeMap<SampleApp, Workload>,
}

/// Declares the whole platform for `profile` into `graph`.
#[instrument(level = Level::INFO, skip_all, fields(profile = %profile.name), err(Display))]
pub fn declare(
    profile: &EnvironmentProfile,
    graph: &mut GraphBuilder,
) -> Result<Platform, ProvisionError> {
    profile.eks.compute.validate()?;

    let account = profile.account.as_str();
    let region = profile.region.as_str();
    let cluster_name = profile.eks.cluster_name.as_str();
    let overlay = overlay::branch(&profile.eks.compute);

    let network = NetworkProvisioner {
        settings: &profile.network,
        region,
    }
    .declare(graph)?;
    let kubectl = KubectlLayerProvisioner { account, region }.declare(graph)?;
    let observability = ObservabilityProvisioner {
        settings: &profile.monitoring,
        account,
        region,
    }
    .declare(graph)?;

    let repository_names: Vec<_> = SampleApp::iter().map(|app| app.name()).collect();
    let repository_names: Vec<_> = repository_names.iter().map(String::as_str).collect();
    let registry = RegistryProvisioner {
        repository_names: &repository_names,
    }
    .declare(graph)?;

    let cluster = ClusterProvisioner {
        profile,
        overlay: &overlay,
        network: &network,
        kubectl: &kubectl,
    }
    .declare(graph)?;

    let monitoring_namespace = profile.monitoring.namespace.as_str();
    let prometheus = PrometheusProvisioner {
        settings: &profile.monitoring,
        cluster: &cluster,
        observability: &observability,
        overlay: &overlay,
        region,
    }
    .declare(graph)?;
    let adapter = MetricsAdapterProvisioner {
        cluster: &cluster,
        overlay: &overlay,
        namespace: monitoring_namespace,
        region,
    }
    .declare(graph)?;
    let collector = CollectorProvisioner {
        cluster: &cluster,
        observability: &observability,
        cluster_name,
        namespace: ekp_config::consts::OPENTELEMETRY_NAMESPACE,
        region,
    }
    .declare(graph)?;

    let workloads = SampleApp::iter()
        .map(|app| {
            let workload = WorkloadProvisioner {
                app,
                cluster: &cluster,
                observability: &observability,
                overlay: &overlay,
                account,
                region,
                cluster_name,
            }
            .declare(graph)?;
            Ok((app, workload))
        })
        .collect::<Result<BTreeMap<_, _>, ProvisionError>>()?;

    info!(
        mode = %overlay.mode,
        resources = graph.len(),
        "declared platform",
    );
    Ok(Platform {
        overlay,
        network,
        kubectl,
        observability,
        registry,
        cluster,
        prometheus,
        adapter,
        collector,
        workloads,
    })
}

/// Declares the platform and finalizes it into a deployment graph.
pub fn build(profile: &EnvironmentProfile) -> Result<(DeploymentGraph, Platform), ProvisionError> {
    let mut graph = GraphBuilder::new();
    let platform = declare(profile, &mut graph)?;
    Ok((graph.finalize()?, platform))
}
