use clap::Parser;

use crate::{ComputeMode, ConfigError, EnvironmentProfile, ModePolicy};

#[derive(Clone, Debug, PartialEq, Parser)]
pub struct PlatformArgs {
    /// Compute mode of the cluster: `fargate` or `auto-mode`
    #[arg(long, env = "EKP_COMPUTE_MODE", default_value = "auto-mode")]
    pub compute_mode: String,

    /// Reject compute modes other than `fargate` and `auto-mode`
    #[arg(long, env = "EKP_STRICT_COMPUTE_MODE")]
    pub strict_compute_mode: bool,

    #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
    pub account: Option<String>,

    #[arg(long, env = "CDK_DEFAULT_REGION")]
    pub region: Option<String>,
}

impl PlatformArgs {
    pub fn policy(&self) -> ModePolicy {
        if self.strict_compute_mode {
            ModePolicy::Strict
        } else {
            ModePolicy::Permissive
        }
    }

    pub fn resolve(&self) -> Result<EnvironmentProfile, ConfigError> {
        // Validate every input before expanding the profile
        let mode = ComputeMode::from_selector(&self.compute_mode, self.policy())?;
        let account = self.account.as_deref().ok_or(ConfigError::MissingAccount)?;
        let region = self.region.as_deref().ok_or(ConfigError::MissingRegion)?;

        EnvironmentProfile::resolve(mode, account, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: &str, strict: bool) -> PlatformArgs {
        PlatformArgs {
            compute_mode: mode.into(),
            strict_compute_mode: strict,
            account: Some("123456789012".into()),
            region: Some("us-west-2".into()),
        }
    }

    #[test]
    fn any_other_selector_means_auto_mode() {
        let profile = args("something-else", false).resolve().unwrap();
        assert_eq!(profile.mode(), ComputeMode::AutoMode);
        assert!(profile.eks.compute.auto_mode_enabled);
    }

    #[test]
    fn strict_selector_fails_before_expansion() {
        assert_eq!(
            args("something-else", true).resolve(),
            Err(ConfigError::UnknownComputeMode {
                selector: "something-else".into(),
            }),
        );
    }

    #[test]
    fn missing_region_is_a_configuration_error() {
        let mut args = args("fargate", false);
        args.region = None;
        assert_eq!(args.resolve(), Err(ConfigError::MissingRegion));
    }

    #[test]
    fn parses_from_command_line() {
        let args = PlatformArgs::try_parse_from([
            "ekp",
            "--compute-mode",
            "fargate",
            "--account",
            "123456789012",
            "--region",
            "eu-west-1",
        ])
        .unwrap();
        assert_eq!(args.resolve().unwrap().mode(), ComputeMode::Fargate);
    }
}
