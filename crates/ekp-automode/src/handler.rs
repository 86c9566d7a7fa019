use serde_json::Value;
use tracing::{error, info, instrument, Level};

use crate::{
    CallbackError, ClusterComputeApi, ComputeApiError, Event, RequestType, Response, Status,
};

pub struct AutoModeHandler<A> {
    api: A,
}

impl<A> AutoModeHandler<A>
where
    A: ClusterComputeApi,
{
    pub const fn new(api: A) -> Self {
        Self { api }
    }

    /// Handles one raw custom resource request.
    pub async fn on_json(&self, event: Value) -> Result<Value, CallbackError> {
        let event = ::serde_json::from_value(event)?;
        let response = self.on_event(event).await?;
        ::serde_json::to_value(response).map_err(Into::into)
    }

    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(
            request = %event.request_type,
            cluster = %event.resource_properties.cluster_name,
        ),
        err(Display),
    )]
    pub async fn on_event(&self, event: Event) -> Result<Response, CallbackError> {
        let properties = &event.resource_properties;
        let cluster = properties.cluster_name.as_str();

        match event.request_type {
            RequestType::Create | RequestType::Update => {
                info!("enabling auto mode");
                let update_id = self
                    .api
                    .enable(cluster, &properties.node_role_arn, &properties.node_pools())
                    .await?;
                info!(%update_id, "auto mode update initiated");
                Ok(Response::new(cluster, Some(update_id), Status::Initiated))
            }
            RequestType::Delete => {
                info!("disabling auto mode");
                match self.api.disable(cluster).await {
                    Ok(update_id) => {
                        Ok(Response::new(cluster, Some(update_id), Status::Disabled))
                    }
                    Err(ComputeApiError::NotFound { .. }) => {
                        info!("cluster not found during delete; treating as success");
                        Ok(Response::new(cluster, None, Status::NotFound))
                    }
                    Err(e) => {
                        error!("failed to disable auto mode: {e}");
                        Err(e.into())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::ResourceProperties;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Enable {
            cluster: String,
            node_role_arn: String,
            node_pools: Vec<String>,
        },
        Disable {
            cluster: String,
        },
    }

    #[derive(Default)]
    struct MockComputeApi {
        calls: Mutex<Vec<Call>>,
        failure: Option<ComputeApiError>,
    }

    impl MockComputeApi {
        fn failing(error: ComputeApiError) -> Self {
            Self {
                failure: Some(error),
                ..Default::default()
            }
        }

        fn record(&self, call: Call) -> Result<String, ComputeApiError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            match &self.failure {
                Some(error) => Err(error.clone()),
                None => Ok(format!("update-{}", calls.len())),
            }
        }
    }

    #[async_trait]
    impl ClusterComputeApi for MockComputeApi {
        async fn enable(
            &self,
            cluster: &str,
            node_role_arn: &str,
            node_pools: &[String],
        ) -> Result<String, ComputeApiError> {
            self.record(Call::Enable {
                cluster: cluster.into(),
                node_role_arn: node_role_arn.into(),
                node_pools: node_pools.to_vec(),
            })
        }

        async fn disable(&self, cluster: &str) -> Result<String, ComputeApiError> {
            self.record(Call::Disable {
                cluster: cluster.into(),
            })
        }
    }

    const CLUSTER: &str = "dev-eks-automode";
    const NODE_ROLE: &str = "arn:aws:iam::123456789012:role/EksNodeGroupServiceRole";

    fn event(request_type: RequestType) -> Event {
        Event {
            request_type,
            resource_properties: ResourceProperties {
                cluster_name: CLUSTER.into(),
                node_role_arn: NODE_ROLE.into(),
                node_pools: None,
            },
        }
    }

    #[tokio::test]
    async fn create_and_update_enable_auto_mode() {
        let handler = AutoModeHandler::new(MockComputeApi::default());

        for (request_type, update_id) in [
            (RequestType::Create, "update-1"),
            (RequestType::Update, "update-2"),
        ] {
            let response = handler.on_event(event(request_type)).await.unwrap();
            assert_eq!(response.physical_resource_id, "dev-eks-automode-auto-mode");
            assert_eq!(response.data.status, Status::Initiated);
            assert_eq!(response.data.update_id.as_deref(), Some(update_id));
        }

        let calls = handler.api.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            Call::Enable {
                cluster: CLUSTER.into(),
                node_role_arn: NODE_ROLE.into(),
                node_pools: vec!["general-purpose".into(), "system".into()],
            },
        );
    }

    #[tokio::test]
    async fn delete_disables_auto_mode() {
        let handler = AutoModeHandler::new(MockComputeApi::default());

        let response = handler.on_event(event(RequestType::Delete)).await.unwrap();
        assert_eq!(response.data.status, Status::Disabled);
        assert_eq!(
            *handler.api.calls.lock().unwrap(),
            [Call::Disable {
                cluster: CLUSTER.into(),
            }],
        );
    }

    #[tokio::test]
    async fn deleting_a_missing_cluster_succeeds() {
        let handler = AutoModeHandler::new(MockComputeApi::failing(ComputeApiError::NotFound {
            cluster: CLUSTER.into(),
        }));

        let response = handler.on_event(event(RequestType::Delete)).await.unwrap();
        assert_eq!(response.physical_resource_id, "dev-eks-automode-auto-mode");
        assert_eq!(response.data.status, Status::NotFound);
        assert_eq!(response.data.update_id, None);
    }

    #[tokio::test]
    async fn provider_errors_surface_verbatim() {
        let failure = ComputeApiError::Provider("AccessDeniedException: not authorized".into());

        for request_type in [RequestType::Create, RequestType::Delete] {
            let handler = AutoModeHandler::new(MockComputeApi::failing(failure.clone()));
            let error = handler.on_event(event(request_type)).await.unwrap_err();
            assert_eq!(error.to_string(), "AccessDeniedException: not authorized");
        }

        // a missing cluster is only tolerated on delete
        let handler = AutoModeHandler::new(MockComputeApi::failing(ComputeApiError::NotFound {
            cluster: CLUSTER.into(),
        }));
        assert!(handler.on_event(event(RequestType::Create)).await.is_err());
    }

    #[tokio::test]
    async fn handles_raw_json_events() {
        let handler = AutoModeHandler::new(MockComputeApi::default());
        let response = handler
            .on_json(json!({
                "RequestType": "Update",
                "ResourceProperties": {
                    "ClusterName": CLUSTER,
                    "NodeRoleArn": NODE_ROLE,
                    "NodePools": ["system"],
                },
            }))
            .await
            .unwrap();

        assert_eq!(
            response,
            json!({
                "PhysicalResourceId": "dev-eks-automode-auto-mode",
                "Data": { "UpdateId": "update-1", "Status": "INITIATED" },
            }),
        );

        let error = handler
            .on_json(json!({ "RequestType": "Create" }))
            .await
            .unwrap_err();
        assert!(matches!(error, CallbackError::Event(_)));
    }
}
