use async_trait::async_trait;
use aws_sdk_eks::{
    error::{DisplayErrorContext, SdkError},
    operation::update_cluster_config::{UpdateClusterConfigError, UpdateClusterConfigOutput},
    types::{
        BlockStorage, ComputeConfigRequest, ElasticLoadBalancing,
        KubernetesNetworkConfigRequest, StorageConfigRequest,
    },
    Client,
};
use tracing::debug;

use crate::{ClusterComputeApi, ComputeApiError};

/// [`ClusterComputeApi`] over the EKS `UpdateClusterConfig` operation.
#[derive(Clone, Debug)]
pub struct EksComputeApi {
    client: Client,
}

impl EksComputeApi {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Loads credentials and region from the default provider chain.
    pub async fn from_env() -> Self {
        let config = ::aws_config::load_from_env().await;
        Self::new(Client::new(&config))
    }
}

fn update_id(
    cluster: &str,
    result: Result<UpdateClusterConfigOutput, SdkError<UpdateClusterConfigError>>,
) -> Result<String, ComputeApiError> {
    match result {
        Ok(output) => output
            .update()
            .and_then(|update| update.id())
            .map(Into::into)
            .ok_or_else(|| ComputeApiError::Provider("response carries no update id".into())),
        Err(error)
            if error
                .as_service_error()
                .is_some_and(UpdateClusterConfigError::is_resource_not_found_exception) =>
        {
            Err(ComputeApiError::NotFound {
                cluster: cluster.into(),
            })
        }
        Err(error) => Err(ComputeApiError::Provider(
            DisplayErrorContext(error).to_string(),
        )),
    }
}

#[async_trait]
impl ClusterComputeApi for EksComputeApi {
    async fn enable(
        &self,
        cluster: &str,
        node_role_arn: &str,
        node_pools: &[String],
    ) -> Result<String, ComputeApiError> {
        debug!(cluster, node_role_arn, ?node_pools, "updating cluster config");
        let result = self
            .client
            .update_cluster_config()
            .name(cluster)
            .compute_config(
                ComputeConfigRequest::builder()
                    .enabled(true)
                    .node_role_arn(node_role_arn)
                    .set_node_pools(Some(node_pools.to_vec()))
                    .build(),
            )
            .kubernetes_network_config(
                KubernetesNetworkConfigRequest::builder()
                    .elastic_load_balancing(ElasticLoadBalancing::builder().enabled(true).build())
                    .build(),
            )
            .storage_config(
                StorageConfigRequest::builder()
                    .block_storage(BlockStorage::builder().enabled(true).build())
                    .build(),
            )
            .send()
            .await;
        update_id(cluster, result)
    }

    async fn disable(&self, cluster: &str) -> Result<String, ComputeApiError> {
        debug!(cluster, "updating cluster config");
        let result = self
            .client
            .update_cluster_config()
            .name(cluster)
            .compute_config(ComputeConfigRequest::builder().enabled(false).build())
            .send()
            .await;
        update_id(cluster, result)
    }
}
