use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

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
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum ResourceKind {
    // AWS
    Vpc,
    Subnet,
    InternetGateway,
    VpcGatewayAttachment,
    RouteTable,
    SubnetRouteTableAssociation,
    Route,
    Eip,
    NatGateway,
    VpcEndpoint,
    FlowLog,
    LayerVersion,
    IamRole,
    OidcProvider,
    Cluster,
    FargateProfile,
    AccessEntry,
    ClusterAddon,
    Repository,
    PrometheusWorkspace,
    LogGroup,
    GrafanaWorkspace,
    Function,
    Provider,
    AutoModeEnablement,

    // Kubernetes
    Namespace,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    ConfigMap,
    Deployment,
    Service,
    HorizontalPodAutoscaler,
    ApiService,
}

impl ResourceKind {
    /// Resource type written into synthesized templates.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Vpc => "AWS::EC2::VPC",
            Self::Subnet => "AWS::EC2::Subnet",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::VpcGatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            Self::RouteTable => "AWS::EC2::RouteTable",
            Self::SubnetRouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            Self::Route => "AWS::EC2::Route",
            Self::Eip => "AWS::EC2::EIP",
            Self::NatGateway => "AWS::EC2::NatGateway",
            Self::VpcEndpoint => "AWS::EC2::VPCEndpoint",
            Self::FlowLog => "AWS::EC2::FlowLog",
            Self::LayerVersion => "AWS::Lambda::LayerVersion",
            Self::IamRole => "AWS::IAM::Role",
            Self::OidcProvider => "AWS::IAM::OIDCProvider",
            Self::Cluster => "AWS::EKS::Cluster",
            Self::FargateProfile => "AWS::EKS::FargateProfile",
            Self::AccessEntry => "AWS::EKS::AccessEntry",
            Self::ClusterAddon => "AWS::EKS::Addon",
            Self::Repository => "AWS::ECR::Repository",
            Self::PrometheusWorkspace => "AWS::APS::Workspace",
            Self::LogGroup => "AWS::Logs::LogGroup",
            Self::GrafanaWorkspace => "AWS::Grafana::Workspace",
            Self::Function | Self::Provider => "AWS::Lambda::Function",
            Self::AutoModeEnablement => "Custom::EnableAutoMode",
            Self::Namespace
            | Self::ServiceAccount
            | Self::ClusterRole
            | Self::ClusterRoleBinding
            | Self::ConfigMap
            | Self::Deployment
            | Self::Service
            | Self::HorizontalPodAutoscaler
            | Self::ApiService => "Custom::AWSCDK-EKS-KubernetesResource",
        }
    }

    /// The `kind` field of the matching Kubernetes manifest.
    pub const fn kubernetes_kind(&self) -> Option<&'static str> {
        match self {
            Self::Namespace => Some("Namespace"),
            Self::ServiceAccount => Some("ServiceAccount"),
            Self::ClusterRole => Some("ClusterRole"),
            Self::ClusterRoleBinding => Some("ClusterRoleBinding"),
            Self::ConfigMap => Some("ConfigMap"),
            Self::Deployment => Some("Deployment"),
            Self::Service => Some("Service"),
            Self::HorizontalPodAutoscaler => Some("HorizontalPodAutoscaler"),
            Self::ApiService => Some("APIService"),
            _ => None,
        }
    }

    pub fn from_kubernetes_kind(kind: &str) -> Option<Self> {
        Self::iter().find(|value| value.kubernetes_kind() == Some(kind))
    }

    #[inline]
    pub const fn is_kubernetes(&self) -> bool {
        self.kubernetes_kind().is_some()
    }

    /// Whether objects of this kind live inside a namespace.
    pub const fn is_namespaced(&self) -> bool {
        matches!(
            self,
            Self::ServiceAccount
                | Self::ConfigMap
                | Self::Deployment
                | Self::Service
                | Self::HorizontalPodAutoscaler,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubernetes_kinds_round_trip() {
        for kind in ResourceKind::iter().filter(ResourceKind::is_kubernetes) {
            let name = kind.kubernetes_kind().unwrap();
            assert_eq!(ResourceKind::from_kubernetes_kind(name), Some(kind));
        }
        assert_eq!(ResourceKind::from_kubernetes_kind("Pod"), None);
    }

    #[test]
    fn cluster_scoped_kinds_are_not_namespaced() {
        assert!(!ResourceKind::Namespace.is_namespaced());
        assert!(!ResourceKind::ClusterRole.is_namespaced());
        assert!(!ResourceKind::ApiService.is_namespaced());
        assert!(!ResourceKind::FargateProfile.is_namespaced());
        assert!(ResourceKind::Deployment.is_namespaced());
    }
}
