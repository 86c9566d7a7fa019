use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unsupported kubernetes kind: {kind:?}")]
    UnsupportedKind { kind: String },
    #[error("kubernetes manifest has no {field}")]
    MissingField { field: &'static str },
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] ::serde_json::Error),
}
