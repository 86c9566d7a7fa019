use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use crate::ConfigError;

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
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
pub enum ComputeMode {
    #[default]
    #[serde(rename = "auto-mode")]
    #[strum(serialize = "auto-mode")]
    AutoMode,
    #[serde(rename = "fargate")]
    #[strum(serialize = "fargate")]
    Fargate,
}

impl ComputeMode {
    /// Resolves a raw mode selector.
    ///
    /// The permissive policy treats every selector other than `fargate` as
    /// Auto Mode; the strict one only accepts the two known names.
    pub fn from_selector(selector: &str, policy: ModePolicy) -> Result<Self, ConfigError> {
        match selector.parse::<Self>() {
            Ok(mode) => Ok(mode),
            Err(_) => match policy {
                ModePolicy::Permissive => {
                    warn!("unknown compute mode {selector:?}; falling back to auto-mode");
                    Ok(Self::AutoMode)
                }
                ModePolicy::Strict => Err(ConfigError::UnknownComputeMode {
                    selector: selector.into(),
                }),
            },
        }
    }

    /// `AutoMode` or `Fargate`, used to prefix construct ids.
    pub const fn id_prefix(&self) -> &'static str {
        match self {
            Self::AutoMode => "AutoMode",
            Self::Fargate => "Fargate",
        }
    }

    #[inline]
    pub const fn is_fargate(&self) -> bool {
        matches!(self, Self::Fargate)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ModePolicy {
    #[default]
    Permissive,
    Strict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors_parse_under_both_policies() {
        for policy in [ModePolicy::Permissive, ModePolicy::Strict] {
            assert_eq!(
                ComputeMode::from_selector("fargate", policy),
                Ok(ComputeMode::Fargate),
            );
            assert_eq!(
                ComputeMode::from_selector("auto-mode", policy),
                Ok(ComputeMode::AutoMode),
            );
        }
    }

    #[test]
    fn permissive_policy_falls_back_to_auto_mode() {
        for selector in ["", "Fargate", "ec2", "automode"] {
            assert_eq!(
                ComputeMode::from_selector(selector, ModePolicy::Permissive),
                Ok(ComputeMode::AutoMode),
            );
        }
    }

    #[test]
    fn strict_policy_rejects_unknown_selectors() {
        assert_eq!(
            ComputeMode::from_selector("ec2", ModePolicy::Strict),
            Err(ConfigError::UnknownComputeMode {
                selector: "ec2".into(),
            }),
        );
    }

    #[test]
    fn display_matches_selector() {
        assert_eq!(ComputeMode::AutoMode.to_string(), "auto-mode");
        assert_eq!(ComputeMode::Fargate.to_string(), "fargate");
    }
}
