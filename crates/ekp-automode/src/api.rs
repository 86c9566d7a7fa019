use async_trait::async_trait;

use crate::ComputeApiError;

/// The cluster configuration API the callback drives.
///
/// Both calls only initiate an asynchronous cluster update and return its id.
#[async_trait]
pub trait ClusterComputeApi: Send + Sync {
    /// Enables Auto Mode compute together with elastic load balancing and
    /// block storage.
    async fn enable(
        &self,
        cluster: &str,
        node_role_arn: &str,
        node_pools: &[String],
    ) -> Result<String, ComputeApiError>;

    async fn disable(&self, cluster: &str) -> Result<String, ComputeApiError>;
}
