mod capability;
mod error;
mod id;
pub mod k8s;
mod kind;
mod resource;

pub use self::{
    capability::Capability,
    error::ResourceError,
    id::ResourceId,
    kind::ResourceKind,
    resource::DeclaredResource,
};

pub mod consts {
    pub const LABEL_APP: &str = "app";
    pub const LABEL_COMPUTE_TYPE: &str = "compute-type";
}
