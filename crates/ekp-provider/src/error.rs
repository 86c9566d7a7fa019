use ekp_config::ConfigError;
use ekp_graph::GraphError;
use ekp_openapi::ResourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
