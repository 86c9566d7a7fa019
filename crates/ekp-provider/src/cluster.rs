use std::collections::BTreeMap;

use ekp_config::{consts as config_consts, EnvironmentProfile};
use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{k8s, Capability, DeclaredResource, ResourceId, ResourceKind};
use maplit::btreemap;
use serde_json::json;
use tracing::{debug, instrument, Level};

use crate::{
    consts,
    overlay::{ClusterCompute, ComputeOverlay},
    provisioner::{
        allow, managed_policy, policy_document, service_trust, web_identity_trust, Manifests,
    },
    KubectlLayer, Network, ProvisionError, Provisioner,
};

/// Managed add-ons: `(construct suffix, add-on, pinned version)`.
const ADDONS: &[(&str, &str, Option<&str>)] = &[
    ("CoreDnsAddon", "coredns", Some("v1.11.4-eksbuild.14")),
    ("PodIdentityAgentAddon", "eks-pod-identity-agent", Some("v1.3.7-eksbuild.2")),
    ("VpcCniAddon", "vpc-cni", None),
    ("KubeProxyAddon", "kube-proxy", None),
];

const CLUSTER_POLICIES: &[&str] = &[
    "AmazonEKSClusterPolicy",
    "AmazonEKSComputePolicy",
    "AmazonEKSBlockStoragePolicy",
    "AmazonEKSLoadBalancingPolicy",
    "AmazonEKSNetworkingPolicy",
];

const NODE_POLICIES: &[&str] = &[
    "AmazonEKSWorkerNodePolicy",
    "AmazonEKS_CNI_Policy",
    "AmazonEC2ContainerRegistryReadOnly",
    "AmazonEKSComputePolicy",
    "AmazonEKSBlockStoragePolicy",
    "AmazonEKSLoadBalancingPolicy",
    "AmazonEKSNetworkingPolicy",
];

const CLUSTER_ADMIN_POLICY: &str =
    "arn:aws:eks::aws:cluster-access-policy/AmazonEKSClusterAdminPolicy";

const ADOT_ROLE_NAME: &str = "EKS-ADOT-PrometheusRemoteWrite-EksClusterStack";

#[derive(Clone, Debug)]
pub struct EksCluster {
    pub cluster: ResourceId,
    pub cluster_role: ResourceId,
    pub node_role: ResourceId,
    pub oidc_provider: ResourceId,
    pub kubectl_handler: ResourceId,
    pub monitoring_namespace: ResourceId,
    pub opentelemetry_namespace: ResourceId,
    /// Fargate profiles, or the Auto Mode enablement callback.
    pub compute: Vec<ResourceId>,
    pub addons: Vec<ResourceId>,
    pub adot_role: ResourceId,
}

impl EksCluster {
    /// Reference token for the cluster name.
    pub fn name(&self) -> String {
        self.cluster.attr("Ref")
    }

    pub fn stack(&self) -> ResourceId {
        ResourceId::new(self.cluster.stack())
    }

    pub(crate) fn manifests<'a>(&'a self, scope: &'a ResourceId) -> Manifests<'a> {
        Manifests {
            cluster: &self.cluster,
            scope,
        }
    }
}

pub struct ClusterProvisioner<'a> {
    pub profile: &'a EnvironmentProfile,
    pub overlay: &'a ComputeOverlay,
    pub network: &'a Network,
    pub kubectl: &'a KubectlLayer,
}

impl ClusterProvisioner<'_> {
    fn role(
        graph: &mut GraphBuilder,
        id: ResourceId,
        service: &str,
        policies: &[&str],
    ) -> Result<ResourceId, ProvisionError> {
        let policies: Vec<_> = policies.iter().map(|&name| managed_policy(name)).collect();
        graph
            .add(DeclaredResource::new(
                id,
                ResourceKind::IamRole,
                service,
                json!({
                    "AssumeRolePolicyDocument": service_trust(service),
                    "ManagedPolicyArns": policies,
                }),
            ))
            .map_err(Into::into)
    }

    fn fargate_profiles(
        &self,
        graph: &mut GraphBuilder,
        cluster: &ResourceId,
        profiles: &[String],
    ) -> Result<Vec<ResourceId>, ProvisionError> {
        let pod_execution_role = Self::role(
            graph,
            cluster.child("FargatePodExecutionRole"),
            "eks-fargate-pods.amazonaws.com",
            &["AmazonEKSFargatePodExecutionRolePolicy"],
        )?;
        let subnets: Vec<_> = self
            .network
            .private_subnets
            .iter()
            .map(|subnet| subnet.attr("Ref"))
            .collect();

        // Profiles select namespaces by name and do not wait for them
        profiles
            .iter()
            .map(|namespace| {
                let name = format!("{namespace}-fargate-profile");
                graph
                    .add(
                        DeclaredResource::new(
                            cluster.child(&name),
                            ResourceKind::FargateProfile,
                            &name,
                            json!({
                                "ClusterName": cluster.attr("Ref"),
                                "FargateProfileName": name,
                                "PodExecutionRoleArn": pod_execution_role.attr("Arn"),
                                "Subnets": subnets,
                                "Selectors": [{ "Namespace": namespace }],
                            }),
                        )
                        .providing(Capability::ComputeCapacity),
                    )
                    .map_err(Into::into)
            })
            .collect()
    }

    fn enable_auto_mode(
        &self,
        graph: &mut GraphBuilder,
        stack: &ResourceId,
        cluster: &ResourceId,
        node_role: &ResourceId,
        node_pools: &[String],
    ) -> Result<ResourceId, ProvisionError> {
        let account = &self.profile.account;
        let node_role_arn = node_role.attr("Arn");
        let service_linked_roles = ["compute.eks.amazonaws.com", "eks-compute.amazonaws.com"]
            .map(|service| format!("arn:aws:iam::{account}:role/aws-service-role/{service}/*"));
        let lambda_role = graph.add(DeclaredResource::new(
            stack.child("AutoModeLambdaRole"),
            ResourceKind::IamRole,
            "auto-mode-lambda",
            json!({
                "AssumeRolePolicyDocument": service_trust("lambda.amazonaws.com"),
                "ManagedPolicyArns": [managed_policy("service-role/AWSLambdaBasicExecutionRole")],
                "Policies": [{
                    "PolicyName": "EnableAutoMode",
                    "PolicyDocument": policy_document(vec![
                        allow(&["eks:*"], &["*"]),
                        allow(
                            &["iam:PassRole", "iam:GetRole", "iam:CreateServiceLinkedRole"],
                            &[
                                node_role_arn.as_str(),
                                service_linked_roles[0].as_str(),
                                service_linked_roles[1].as_str(),
                            ],
                        ),
                        allow(
                            &[
                                "ec2:DescribeSubnets",
                                "ec2:DescribeVpcs",
                                "ec2:DescribeSecurityGroups",
                                "ec2:DescribeRouteTables",
                                "ec2:DescribeAvailabilityZones",
                                "ec2:DescribeInstances",
                                "ec2:DescribeInstanceTypes",
                                "autoscaling:DescribeAutoScalingGroups",
                                "logs:CreateLogGroup",
                                "logs:CreateLogStream",
                                "logs:PutLogEvents",
                            ],
                            &["*"],
                        ),
                    ]),
                }],
            }),
        ))?;

        let handler = graph.add(DeclaredResource::new(
            stack.child("AutoModeLambda"),
            ResourceKind::Function,
            "auto-mode-handler",
            json!({
                "Runtime": "provided.al2023",
                "Handler": "bootstrap",
                "Code": {
                    "S3Bucket": format!("ekp-assets-{account}-{}", self.profile.region),
                    "S3Key": "ekp-automode.zip",
                },
                "Role": lambda_role.attr("Arn"),
                "Timeout": 900,
                "Description": "Enables EKS Auto Mode with the built-in node pools",
            }),
        ))?;

        let provider = graph.add(DeclaredResource::new(
            stack.child("AutoModeProvider"),
            ResourceKind::Provider,
            "auto-mode-provider",
            json!({
                "Runtime": "nodejs18.x",
                "Handler": "framework.onEvent",
                "Role": lambda_role.attr("Arn"),
                "Timeout": 900,
                "Environment": {
                    "Variables": { "USER_ON_EVENT_FUNCTION_ARN": handler.attr("Arn") },
                },
                "LoggingConfig": { "LogFormat": "JSON" },
            }),
        ))?;

        let enabler = graph.add(
            DeclaredResource::new(
                stack.child("EnableAutoMode"),
                ResourceKind::AutoModeEnablement,
                "enable-auto-mode",
                json!({
                    "ServiceToken": provider.attr("Arn"),
                    "ClusterName": cluster.attr("Ref"),
                    "NodeRoleArn": node_role_arn,
                    "NodePools": node_pools,
                }),
            )
            .providing(Capability::ComputeCapacity),
        )?;
        graph.depends_on(&enabler, cluster);
        Ok(enabler)
    }

    /// `aws-auth` mappings for admins and, on Fargate, the pod execution role.
    fn aws_auth(
        &self,
        graph: &mut GraphBuilder,
        manifests: Manifests<'_>,
        pod_execution_role: Option<ResourceId>,
    ) -> Result<Option<ResourceId>, ProvisionError> {
        let eks = &self.profile.eks;

        let mut map_roles = String::default();
        if let Some(role) = &pod_execution_role {
            map_roles.push_str(&format!("- rolearn: {}\n", role.attr("Arn")));
            map_roles.push_str("  username: system:node:{{SessionName}}\n");
            map_roles.push_str(
                "  groups:\n  - system:bootstrappers\n  - system:nodes\n  - system:node-proxier\n",
            );
        }
        if let Some(arn) = &eks.admin_role_arn {
            map_roles.push_str(&format!(
                "- rolearn: {arn}\n  username: {arn}\n  groups:\n  - system:masters\n",
            ));
        }
        let map_users = eks
            .admin_user_arn
            .as_ref()
            .map(|arn| {
                format!("- userarn: {arn}\n  username: {arn}\n  groups:\n  - system:masters\n")
            });

        if map_roles.is_empty() && map_users.is_none() {
            return Ok(None);
        }

        let mut data = BTreeMap::new();
        if !map_roles.is_empty() {
            data.insert("mapRoles".to_string(), map_roles);
        }
        if let Some(map_users) = map_users {
            data.insert("mapUsers".to_string(), map_users);
        }
        let config = k8s::config_map("aws-auth", config_consts::KUBE_SYSTEM_NAMESPACE, data);
        manifests.add(graph, "AwsAuth", &config).map(Some)
    }

    fn logging(
        &self,
        graph: &mut GraphBuilder,
        manifests: Manifests<'_>,
    ) -> Result<ResourceId, ProvisionError> {
        let filters = "
[FILTER]
    Name kubernetes
    Match kube.*
    Merge_Log On
    Keep_Log Off
    Buffer_Size 0
    Kube_Meta_Cache_TTL 300s
[FILTER]
    Name aws
    Match kube.*
    imds_version v1
";
        let output = format!(
            "
[OUTPUT]
    Name cloudwatch_logs
    Match kube.*
    region {region}
    log_group_name /aws/eks/{cluster}/auto-mode/application
    log_stream_prefix auto-mode-
    auto_create_group true
    log_retention_days 7
",
            region = self.profile.region,
            cluster = self.profile.eks.cluster_name,
        );

        let config = k8s::config_map(
            "aws-logging",
            config_consts::KUBE_SYSTEM_NAMESPACE,
            btreemap! {
                "enable".into() => "true".into(),
                "flb_log_cw".into() => "false".into(),
                "filters.conf".into() => filters.into(),
                "output.conf".into() => output,
            },
        );
        manifests.add(graph, "ClusterLogging", &config)
    }
}

impl Provisioner for ClusterProvisioner<'_> {
    type Output = EksCluster;

    #[instrument(level = Level::INFO, skip_all, fields(mode = %self.overlay.mode), err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let stack = ResourceId::new(consts::STACK_EKS_CLUSTER);
        let eks = &self.profile.eks;
        let prefix = self.overlay.addon_prefix;

        let cluster_role = Self::role(
            graph,
            stack.child("EksClusterServiceRole"),
            "eks.amazonaws.com",
            CLUSTER_POLICIES,
        )?;
        let node_role = Self::role(
            graph,
            stack.child("EksNodeGroupServiceRole"),
            "ec2.amazonaws.com",
            NODE_POLICIES,
        )?;

        let subnets: Vec<_> = self.network.subnets().map(|subnet| subnet.attr("Ref")).collect();
        let cluster = graph.add(
            DeclaredResource::new(
                stack.child(&format!("{prefix}Cluster")),
                ResourceKind::Cluster,
                &eks.cluster_name,
                json!({
                    "Name": eks.cluster_name,
                    "Version": eks.version,
                    "RoleArn": cluster_role.attr("Arn"),
                    "ResourcesVpcConfig": {
                        "SubnetIds": subnets,
                        "EndpointPublicAccess": true,
                        "EndpointPrivateAccess": true,
                    },
                    "AccessConfig": {
                        "AuthenticationMode": "API_AND_CONFIG_MAP",
                        "BootstrapClusterCreatorAdminPermissions": true,
                    },
                }),
            )
            .providing(Capability::KubernetesApi),
        )?;

        let kubectl_handler = graph.add(
            DeclaredResource::new(
                cluster.child("KubectlHandler"),
                ResourceKind::Function,
                "kubectl-handler",
                json!({
                    "Runtime": "python3.11",
                    "Handler": "index.handler",
                    "Layers": [self.kubectl.layer.attr("Ref")],
                    "Role": cluster_role.attr("Arn"),
                    "Timeout": 900,
                    "Environment": {
                        "Variables": { "CLUSTER_NAME": cluster.attr("Ref") },
                    },
                }),
            )
            .providing(Capability::KubernetesApi),
        )?;

        let oidc_provider = graph.add(DeclaredResource::new(
            cluster.child("OpenIdConnectProvider"),
            ResourceKind::OidcProvider,
            "oidc",
            json!({
                "Url": cluster.attr("OpenIdConnectIssuerUrl"),
                "ClientIdList": ["sts.amazonaws.com"],
            }),
        ))?;

        let manifests = Manifests {
            cluster: &cluster,
            scope: &stack,
        };
        let monitoring_namespace = manifests.add(
            graph,
            &format!("{prefix}MonitoringNamespace"),
            &k8s::namespace(config_consts::MONITORING_NAMESPACE),
        )?;
        let opentelemetry_namespace = manifests.add(
            graph,
            &format!("{prefix}OpenTelemetryNamespace"),
            &k8s::namespace(config_consts::OPENTELEMETRY_NAMESPACE),
        )?;

        let (compute, pod_execution_role) = match &self.overlay.cluster {
            ClusterCompute::Fargate { profiles } => (
                self.fargate_profiles(graph, &cluster, profiles)?,
                Some(cluster.child("FargatePodExecutionRole")),
            ),
            ClusterCompute::AutoMode { node_pools } => (
                vec![self.enable_auto_mode(graph, &stack, &cluster, &node_role, node_pools)?],
                None,
            ),
        };
        debug!(compute = compute.len(), "declared cluster compute");

        self.aws_auth(graph, manifests, pod_execution_role)?;

        graph.add(DeclaredResource::new(
            stack.child("ClusterCreatorAccessEntry"),
            ResourceKind::AccessEntry,
            "cluster-creator",
            json!({
                "ClusterName": cluster.attr("Ref"),
                "PrincipalArn": format!("arn:aws:iam::{}:root", self.profile.account),
                "Type": "STANDARD",
                "AccessPolicies": [{
                    "PolicyArn": CLUSTER_ADMIN_POLICY,
                    "AccessScope": { "Type": "cluster" },
                }],
            }),
        ))?;

        let addons = ADDONS
            .iter()
            .map(|&(suffix, name, version)| {
                let mut spec = json!({
                    "AddonName": name,
                    "ClusterName": cluster.attr("Ref"),
                    "ResolveConflicts": "OVERWRITE",
                });
                if let Some(version) = version {
                    spec["AddonVersion"] = version.into();
                }
                graph.add(DeclaredResource::new(
                    stack.child(&format!("{prefix}{suffix}")),
                    ResourceKind::ClusterAddon,
                    name,
                    spec,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let adot_role = graph.add(DeclaredResource::new(
            stack.child("AdotCollectorRole"),
            ResourceKind::IamRole,
            ADOT_ROLE_NAME,
            json!({
                "RoleName": ADOT_ROLE_NAME,
                "AssumeRolePolicyDocument": web_identity_trust(&oidc_provider),
                "ManagedPolicyArns": [
                    managed_policy("AmazonPrometheusRemoteWriteAccess"),
                    managed_policy("AWSXRayDaemonWriteAccess"),
                ],
                "Policies": [{
                    "PolicyName": "AdotCollector",
                    "PolicyDocument": policy_document(vec![allow(
                        &[
                            "cloudwatch:PutMetricData",
                            "logs:PutLogEvents",
                            "logs:CreateLogGroup",
                            "logs:CreateLogStream",
                            "logs:DescribeLogStreams",
                            "logs:DescribeLogGroups",
                            "ec2:DescribeInstances",
                            "ec2:DescribeTags",
                            "eks:DescribeCluster",
                            "eks:ListClusters",
                        ],
                        &["*"],
                    )]),
                }],
            }),
        ))?;

        self.logging(graph, manifests)?;

        let auto_mode_status = if self.overlay.mode.is_fargate() {
            "Disabled (Fargate)"
        } else {
            "Enabled"
        };
        for (name, value, description) in [
            (
                "ClusterName",
                cluster.attr("Ref"),
                format!("EKS {} cluster name", self.overlay.mode),
            ),
            ("ClusterEndpoint", cluster.attr("Endpoint"), "EKS cluster endpoint".into()),
            ("ClusterArn", cluster.attr("Arn"), "EKS cluster ARN".into()),
            (
                "KubectlConfigCommand",
                format!(
                    "aws eks update-kubeconfig --name {} --region {}",
                    cluster.attr("Ref"),
                    self.profile.region,
                ),
                "Command to configure kubectl".into(),
            ),
            ("AutoModeStatus", auto_mode_status.into(), "Auto Mode enablement status".into()),
            ("AdotRoleArn", adot_role.attr("Arn"), "ADOT collector IAM role ARN".into()),
            (
                "ClusterServiceRoleArn",
                cluster_role.attr("Arn"),
                "EKS cluster service role ARN".into(),
            ),
        ] {
            graph.output(StackOutput::new(consts::STACK_EKS_CLUSTER, name, value, description));
        }

        Ok(EksCluster {
            cluster,
            cluster_role,
            node_role,
            oidc_provider,
            kubectl_handler,
            monitoring_namespace,
            opentelemetry_namespace,
            compute,
            addons,
            adot_role,
        })
    }
}
