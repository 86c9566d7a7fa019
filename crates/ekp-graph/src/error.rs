use std::{io, path::PathBuf};

use ekp_openapi::ResourceId;
use itertools::Itertools;
use thiserror::Error;

/// Raised while building or finalizing the graph, before any synthesis.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle: {}", path.iter().join(" -> "))]
    Cycle { path: Vec<ResourceId> },
    #[error("{resource} references undeclared resource {reference}")]
    UnknownReference {
        resource: ResourceId,
        reference: ResourceId,
    },
    #[error("{resource} depends on undeclared resource {dependency}")]
    UnknownDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },
    #[error("resource declared twice: {id}")]
    DuplicateResource { id: ResourceId },
}

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("{first} and {second} share the logical id {logical_id}")]
    DuplicateLogicalId {
        logical_id: String,
        first: ResourceId,
        second: ResourceId,
    },
    #[error("failed to encode template: {0}")]
    Encode(#[from] ::serde_json::Error),
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
