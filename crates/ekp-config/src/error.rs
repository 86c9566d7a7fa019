use thiserror::Error;

/// Invalid or contradictory input, raised before any graph is built.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown compute mode {selector:?}: expected one of \"auto-mode\", \"fargate\"")]
    UnknownComputeMode { selector: String },
    #[error("missing AWS account: pass --account or set CDK_DEFAULT_ACCOUNT")]
    MissingAccount,
    #[error("missing AWS region: pass --region or set CDK_DEFAULT_REGION")]
    MissingRegion,
    #[error("inconsistent compute settings for {mode}: {reason}")]
    InconsistentCompute { mode: String, reason: String },
}
