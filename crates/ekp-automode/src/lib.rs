//! Custom resource callback that switches EKS Auto Mode on and off for an
//! existing cluster.

mod api;
#[cfg(feature = "aws")]
mod aws;
mod error;
mod event;
mod handler;

pub use self::{
    api::ClusterComputeApi,
    error::{CallbackError, ComputeApiError},
    event::{Event, RequestType, ResourceProperties, Response, ResponseData, Status},
    handler::AutoModeHandler,
};

#[cfg(feature = "aws")]
pub use self::aws::EksComputeApi;

pub mod consts {
    /// Built-in node pools enabled when the event does not name any.
    pub const DEFAULT_NODE_POOLS: &[&str] = &["general-purpose", "system"];
}
