use ekp_config::{ComputeMode, EnvironmentProfile};
use ekp_graph::{
    synth::logical_id, CloudAssembly, DeploymentGraph, EdgeReason, GraphBuilder, GraphError,
};
use ekp_openapi::{k8s, DeclaredResource, ResourceId};
use ekp_provider::{build, declare, Platform, ProvisionError, SampleApp};
use serde_json::json;

const ACCOUNT: &str = "123456789012";
const REGION: &str = "us-west-2";

fn platform(mode: ComputeMode) -> (DeploymentGraph, Platform) {
    let profile = EnvironmentProfile::resolve(mode, ACCOUNT, REGION).unwrap();
    build(&profile).unwrap()
}

#[track_caller]
fn assert_before(graph: &DeploymentGraph, predecessor: &ResourceId, successor: &ResourceId) {
    assert!(
        graph.has_edge(predecessor, successor),
        "expected {predecessor} -> {successor}",
    );
    assert!(
        !graph.has_edge(successor, predecessor),
        "unexpected {successor} -> {predecessor}",
    );
}

fn has_rule(
    graph: &DeploymentGraph,
    predecessor: &ResourceId,
    successor: &ResourceId,
    rule: &'static str,
) -> bool {
    graph
        .reasons(predecessor, successor)
        .is_some_and(|reasons| reasons.contains(&EdgeReason::Rule { name: rule }))
}

#[test]
fn service_accounts_and_config_maps_precede_their_deployments() {
    let (graph, platform) = platform(ComputeMode::AutoMode);
    let prometheus = &platform.prometheus;

    assert_before(&graph, &platform.cluster.monitoring_namespace, &prometheus.service_account);
    assert_before(&graph, &prometheus.service_account, &prometheus.deployment);
    assert_before(&graph, &prometheus.config, &prometheus.deployment);
    assert!(has_rule(
        &graph,
        &prometheus.config,
        &prometheus.deployment,
        "config-map-before-deployment",
    ));

    let collector = &platform.collector;
    assert_before(&graph, &platform.cluster.opentelemetry_namespace, &collector.service_account);
    assert_before(&graph, &collector.service_account, &collector.deployment);
    assert_before(&graph, &collector.config, &collector.deployment);
}

#[test]
fn cluster_roles_precede_their_bindings() {
    let (graph, platform) = platform(ComputeMode::AutoMode);

    for (role, binding) in [
        (&platform.prometheus.cluster_role, &platform.prometheus.cluster_role_binding),
        (&platform.adapter.cluster_role, &platform.adapter.cluster_role_binding),
        (&platform.collector.cluster_role, &platform.collector.cluster_role_binding),
    ] {
        assert_before(&graph, role, binding);
        assert!(
            has_rule(&graph, role, binding, "cluster-role-before-binding"),
            "{binding} is not ordered after {role}",
        );
    }

    // bindings only follow the role they reference
    let adapter_binding = &platform.adapter.cluster_role_binding;
    let collector_binding = &platform.collector.cluster_role_binding;
    assert!(!graph.has_edge(&platform.prometheus.cluster_role, adapter_binding));
    assert!(!graph.has_edge(&platform.adapter.cluster_role, collector_binding));
}

#[test]
fn collector_is_running_before_the_instrumented_app() {
    let (graph, platform) = platform(ComputeMode::AutoMode);
    let otel = &platform.workloads[&SampleApp::Otel];

    assert_before(&graph, &platform.collector.deployment, &otel.deployment);
    assert_before(&graph, &platform.collector.service, &otel.deployment);
    assert!(has_rule(
        &graph,
        &platform.collector.deployment,
        &otel.deployment,
        "collector-before-instrumented-app",
    ));

    // best-effort exporters do not wait
    let go = &platform.workloads[&SampleApp::GoOtel];
    assert!(!graph.has_edge(&platform.collector.deployment, &go.deployment));
}

#[test]
fn custom_metrics_are_served_before_any_autoscaler() {
    let (graph, platform) = platform(ComputeMode::AutoMode);
    let adapter = &platform.adapter;

    assert_before(&graph, &platform.prometheus.deployment, &adapter.deployment);
    assert_before(&graph, &adapter.service, &adapter.api_service);

    for (app, workload) in &platform.workloads {
        assert_before(&graph, &adapter.deployment, &workload.autoscaler);
        assert_before(&graph, &adapter.api_service, &workload.autoscaler);
        assert_before(&graph, &workload.deployment, &workload.service);
        assert_before(&graph, &workload.service, &workload.autoscaler);
        assert!(
            has_rule(
                &graph,
                &workload.deployment,
                &workload.autoscaler,
                "scale-target-before-autoscaler",
            ),
            "{app} autoscaler is not ordered after its target",
        );
    }
}

#[test]
fn auto_mode_enablement_precedes_everything_scheduled() {
    let (graph, platform) = platform(ComputeMode::AutoMode);
    let [enable] = platform.cluster.compute.as_slice() else {
        panic!("expected a single compute resource: {:?}", platform.cluster.compute);
    };
    assert_eq!(enable.segments().last(), Some("EnableAutoMode"));

    for addon in &platform.cluster.addons {
        assert_before(&graph, enable, addon);
    }
    for workload in platform.workloads.values() {
        assert_before(&graph, enable, &workload.deployment);
    }
    assert_before(&graph, enable, &platform.prometheus.deployment);
    assert_before(&graph, enable, &platform.adapter.deployment);
}

#[test]
fn fargate_profiles_precede_every_deployment() {
    let (graph, platform) = platform(ComputeMode::Fargate);
    assert_eq!(platform.cluster.compute.len(), 4);

    for profile in &platform.cluster.compute {
        assert_before(&graph, &platform.cluster.cluster, profile);
        for workload in platform.workloads.values() {
            assert_before(&graph, profile, &workload.deployment);
        }
        assert_before(&graph, profile, &platform.collector.deployment);
    }
}

#[test]
fn cluster_precedes_every_manifest() {
    let (graph, platform) = platform(ComputeMode::Fargate);
    let cluster = &platform.cluster.cluster;

    let manifests: Vec<_> = graph
        .resources()
        .filter(|resource| resource.kind.is_kubernetes())
        .collect();
    assert!(!manifests.is_empty());
    for manifest in manifests {
        assert!(
            graph.has_edge(cluster, &manifest.id),
            "{} is not ordered after the cluster",
            manifest.id,
        );
    }
}

#[test]
fn builds_are_deterministic() {
    for mode in [ComputeMode::AutoMode, ComputeMode::Fargate] {
        let (a, _) = platform(mode);
        let (b, _) = platform(mode);

        assert_eq!(a.waves(), b.waves());
        assert_eq!(a.edges().collect::<Vec<_>>(), b.edges().collect::<Vec<_>>());
        assert_eq!(
            CloudAssembly::synthesize(&a).unwrap(),
            CloudAssembly::synthesize(&b).unwrap(),
        );
    }
}

#[test]
fn autoscaling_the_adapter_on_its_own_metric_is_a_cycle() {
    let profile = EnvironmentProfile::resolve(ComputeMode::AutoMode, ACCOUNT, REGION).unwrap();
    let mut graph = GraphBuilder::new();
    let platform = declare(&profile, &mut graph).unwrap();

    let hpa = k8s::horizontal_pod_autoscaler(
        "prometheus-adapter-hpa",
        &profile.monitoring.namespace,
        "prometheus-adapter",
        (1, 3),
        &k8s::PodsMetric {
            name: "custom_requests_per_second".into(),
            average_value: "10".into(),
        },
    );
    let id = platform.cluster.stack().child("AdapterHPA");
    let resource = DeclaredResource::from_object(id, &hpa)
        .unwrap()
        .on_cluster(&platform.cluster.cluster);
    let hpa = graph.add(resource).unwrap();
    graph.depends_on(&platform.adapter.deployment, &hpa);

    let error: ProvisionError = graph.finalize().unwrap_err().into();
    match error {
        ProvisionError::Graph(GraphError::Cycle { path }) => {
            assert!(path.contains(&hpa), "{path:?}");
            assert!(path.contains(&platform.adapter.deployment), "{path:?}");
        }
        error => panic!("expected a cycle, got {error}"),
    }
}

#[test]
fn synthesizes_one_template_per_stack() {
    let (graph, platform) = platform(ComputeMode::AutoMode);
    let assembly = CloudAssembly::synthesize(&graph).unwrap();

    assert_eq!(
        assembly.templates.keys().map(String::as_str).collect::<Vec<_>>(),
        [
            "EcrStack",
            "EksClusterStack",
            "KubectlLayerStack",
            "NetworkStack",
            "ObservabilityStack",
        ],
    );

    let dependencies = &assembly.manifest["stacks"]["EksClusterStack"]["dependencies"];
    for stack in ["KubectlLayerStack", "NetworkStack", "ObservabilityStack"] {
        assert!(
            dependencies
                .as_array()
                .unwrap()
                .iter()
                .any(|dependency| dependency == stack),
            "EksClusterStack should depend on {stack}: {dependencies}",
        );
    }

    // subnets and the remote write endpoint cross stacks through exports
    let cluster = assembly.templates["EksClusterStack"].to_string();
    assert!(cluster.contains("Fn::ImportValue"));
    assert!(!cluster.contains("${"), "unresolved token left in template");

    let outputs = &assembly.templates["EksClusterStack"]["Outputs"];
    for output in ["ClusterName", "AutoModeStatus", "AdotRoleArn"] {
        assert!(outputs.get(output).is_some(), "missing output {output}");
    }
    assert_eq!(outputs["AutoModeStatus"]["Value"], "Enabled");

    // the cluster name is the cluster's `Ref`
    let namespace = &assembly.templates["EksClusterStack"]["Resources"]
        [logical_id(&platform.cluster.monitoring_namespace)];
    assert_eq!(
        namespace["Properties"]["ClusterName"],
        json!({ "Ref": logical_id(&platform.cluster.cluster) }),
    );
}

#[test]
fn fargate_status_output_reports_disabled() {
    let (graph, _) = platform(ComputeMode::Fargate);
    let assembly = CloudAssembly::synthesize(&graph).unwrap();

    assert_eq!(
        assembly.templates["EksClusterStack"]["Outputs"]["AutoModeStatus"]["Value"],
        "Disabled (Fargate)",
    );
}
