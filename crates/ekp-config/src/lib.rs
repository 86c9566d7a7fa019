mod args;
mod error;
mod mode;
mod profile;

pub use self::{
    args::PlatformArgs,
    error::ConfigError,
    mode::{ComputeMode, ModePolicy},
    profile::{
        ComputeSettings, EksSettings, EnvironmentProfile, MonitoringSettings, NetworkSettings,
    },
};

pub mod consts {
    pub const DEFAULT_NAMESPACE: &str = "default";
    pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";
    pub const MONITORING_NAMESPACE: &str = "monitoring";
    pub const OPENTELEMETRY_NAMESPACE: &str = "opentelemetry";

    pub const EKS_VERSION: &str = "1.32";
}
