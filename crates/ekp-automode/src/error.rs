use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComputeApiError {
    #[error("cluster not found: {cluster}")]
    NotFound { cluster: String },
    #[error("{0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error(transparent)]
    Api(#[from] ComputeApiError),
    #[error("malformed event: {0}")]
    Event(#[from] ::serde_json::Error),
}
