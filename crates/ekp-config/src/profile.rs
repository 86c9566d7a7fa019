use serde::{Deserialize, Serialize};
use tracing::{info, instrument, Level};

use crate::{consts, ComputeMode, ConfigError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    pub vpc_cidr: String,
    pub max_azs: u8,
    pub nat_gateways: u8,
    pub enable_flow_logs: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            vpc_cidr: "10.0.0.0/16".into(),
            max_azs: 2,
            nat_gateways: 1,
            enable_flow_logs: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeSettings {
    pub mode: ComputeMode,
    /// Namespaces that receive a Fargate profile.
    /// Always populated; only read in Fargate mode.
    pub fargate_profiles: Vec<String>,
    pub auto_mode_enabled: bool,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            mode: ComputeMode::AutoMode,
            fargate_profiles: vec![
                consts::DEFAULT_NAMESPACE.into(),
                consts::MONITORING_NAMESPACE.into(),
                consts::KUBE_SYSTEM_NAMESPACE.into(),
            ],
            auto_mode_enabled: true,
        }
    }
}

impl ComputeSettings {
    pub fn fargate() -> Self {
        Self {
            mode: ComputeMode::Fargate,
            fargate_profiles: vec![
                consts::DEFAULT_NAMESPACE.into(),
                consts::MONITORING_NAMESPACE.into(),
                consts::OPENTELEMETRY_NAMESPACE.into(),
                consts::KUBE_SYSTEM_NAMESPACE.into(),
            ],
            auto_mode_enabled: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let inconsistent = |reason: &str| ConfigError::InconsistentCompute {
            mode: self.mode.to_string(),
            reason: reason.into(),
        };

        match self.mode {
            ComputeMode::AutoMode if !self.auto_mode_enabled => {
                Err(inconsistent("auto mode must be enabled"))
            }
            ComputeMode::Fargate if self.auto_mode_enabled => {
                Err(inconsistent("auto mode must be disabled"))
            }
            ComputeMode::Fargate if self.fargate_profiles.is_empty() => {
                Err(inconsistent("at least one fargate profile is required"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksSettings {
    pub cluster_name: String,
    pub version: String,
    pub compute: ComputeSettings,
    pub admin_user_arn: Option<String>,
    pub admin_role_arn: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSettings {
    pub prometheus_enabled: bool,
    pub grafana_enabled: bool,
    pub retention_days: u32,
    pub scrape_interval: String,
    pub namespace: String,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            prometheus_enabled: true,
            grafana_enabled: true,
            retention_days: 30,
            scrape_interval: "15s".into(),
            namespace: consts::MONITORING_NAMESPACE.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentProfile {
    pub name: String,
    pub account: String,
    pub region: String,
    pub network: NetworkSettings,
    pub eks: EksSettings,
    pub monitoring: MonitoringSettings,
}

impl EnvironmentProfile {
    const ADMIN_USER_ARN: &'static str = "arn:aws:iam::123456789:user/user-cli";

    /// Development profile running on Auto Mode.
    pub fn development(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: "dev".into(),
            account: account.into(),
            region: region.into(),
            network: NetworkSettings::default(),
            eks: EksSettings {
                cluster_name: "dev-eks-automode".into(),
                version: consts::EKS_VERSION.into(),
                compute: ComputeSettings::default(),
                admin_user_arn: Some(Self::ADMIN_USER_ARN.into()),
                admin_role_arn: None,
            },
            monitoring: MonitoringSettings {
                retention_days: 7,
                ..Default::default()
            },
        }
    }

    /// Development profile running on Fargate.
    pub fn fargate_development(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: "dev-fargate".into(),
            account: account.into(),
            region: region.into(),
            network: NetworkSettings::default(),
            eks: EksSettings {
                cluster_name: "dev-eks-fargate".into(),
                version: consts::EKS_VERSION.into(),
                compute: ComputeSettings::fargate(),
                admin_user_arn: Some(Self::ADMIN_USER_ARN.into()),
                admin_role_arn: None,
            },
            monitoring: MonitoringSettings {
                retention_days: 7,
                ..Default::default()
            },
        }
    }

    #[instrument(level = Level::INFO, skip(account, region), err(Display))]
    pub fn resolve(mode: ComputeMode, account: &str, region: &str) -> Result<Self, ConfigError> {
        if account.trim().is_empty() {
            return Err(ConfigError::MissingAccount);
        }
        if region.trim().is_empty() {
            return Err(ConfigError::MissingRegion);
        }

        let profile = match mode {
            ComputeMode::Fargate => Self::fargate_development(account, region),
            ComputeMode::AutoMode => Self::development(account, region),
        };
        profile.eks.compute.validate()?;

        info!(
            profile = %profile.name,
            cluster = %profile.eks.cluster_name,
            "resolved environment profile",
        );
        Ok(profile)
    }

    #[inline]
    pub fn mode(&self) -> ComputeMode {
        self.eks.compute.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "123456789012";
    const REGION: &str = "us-west-2";

    #[test]
    fn fargate_profile_maps_every_workload_namespace() {
        let profile = EnvironmentProfile::resolve(ComputeMode::Fargate, ACCOUNT, REGION)
            .expect("fargate profile");

        assert_eq!(profile.name, "dev-fargate");
        assert_eq!(
            profile.eks.compute.fargate_profiles,
            ["default", "monitoring", "opentelemetry", "kube-system"],
        );
        assert!(!profile.eks.compute.auto_mode_enabled);
    }

    #[test]
    fn auto_mode_profile_keeps_unused_fargate_defaults() {
        let profile = EnvironmentProfile::resolve(ComputeMode::AutoMode, ACCOUNT, REGION)
            .expect("auto mode profile");

        assert_eq!(profile.mode(), ComputeMode::AutoMode);
        assert!(profile.eks.compute.auto_mode_enabled);
        assert_eq!(
            profile.eks.compute.fargate_profiles,
            ["default", "monitoring", "kube-system"],
        );
        assert_eq!(profile.eks.cluster_name, "dev-eks-automode");
        assert_eq!(profile.monitoring.retention_days, 7);
        assert_eq!(profile.network.vpc_cidr, "10.0.0.0/16");
    }

    #[test]
    fn resolving_twice_is_deterministic() {
        for mode in [ComputeMode::AutoMode, ComputeMode::Fargate] {
            let a = EnvironmentProfile::resolve(mode, ACCOUNT, REGION).unwrap();
            let b = EnvironmentProfile::resolve(mode, ACCOUNT, REGION).unwrap();
            assert_eq!(a, b);
            assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap(),
            );
        }
    }

    #[test]
    fn missing_identifiers_fail_fast() {
        assert_eq!(
            EnvironmentProfile::resolve(ComputeMode::AutoMode, "", REGION),
            Err(ConfigError::MissingAccount),
        );
        assert_eq!(
            EnvironmentProfile::resolve(ComputeMode::Fargate, ACCOUNT, " "),
            Err(ConfigError::MissingRegion),
        );
    }

    #[test]
    fn contradictory_compute_settings_are_rejected() {
        let compute = ComputeSettings {
            auto_mode_enabled: true,
            ..ComputeSettings::fargate()
        };
        assert!(matches!(
            compute.validate(),
            Err(ConfigError::InconsistentCompute { .. }),
        ));
    }
}
