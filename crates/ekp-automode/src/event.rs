use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::consts::DEFAULT_NODE_POOLS;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceProperties {
    pub cluster_name: String,
    pub node_role_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pools: Option<Vec<String>>,
}

impl ResourceProperties {
    pub fn node_pools(&self) -> Vec<String> {
        self.node_pools.clone().unwrap_or_else(|| {
            DEFAULT_NODE_POOLS
                .iter()
                .map(|&pool| pool.into())
                .collect()
        })
    }
}

/// The subset of a custom resource request the handler reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    pub request_type: RequestType,
    pub resource_properties: ResourceProperties,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Initiated,
    Disabled,
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<String>,
    pub status: Status,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub physical_resource_id: String,
    pub data: ResponseData,
}

impl Response {
    pub fn physical_resource_id(cluster: &str) -> String {
        format!("{cluster}-auto-mode")
    }

    pub(crate) fn new(cluster: &str, update_id: Option<String>, status: Status) -> Self {
        Self {
            physical_resource_id: Self::physical_resource_id(cluster),
            data: ResponseData { update_id, status },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_custom_resource_request() {
        let event: Event = ::serde_json::from_value(json!({
            "RequestType": "Create",
            "ServiceToken": "arn:aws:lambda:us-west-2:123456789012:function:provider",
            "ResourceProperties": {
                "ServiceToken": "arn:aws:lambda:us-west-2:123456789012:function:provider",
                "ClusterName": "dev-eks-automode",
                "NodeRoleArn": "arn:aws:iam::123456789012:role/node",
            },
        }))
        .unwrap();

        assert_eq!(event.request_type, RequestType::Create);
        assert_eq!(event.resource_properties.cluster_name, "dev-eks-automode");
        assert_eq!(
            event.resource_properties.node_pools(),
            ["general-purpose", "system"],
        );
    }

    #[test]
    fn not_found_response_has_no_update_id() {
        let response = Response::new("dev-eks-automode", None, Status::NotFound);
        assert_eq!(
            ::serde_json::to_value(&response).unwrap(),
            json!({
                "PhysicalResourceId": "dev-eks-automode-auto-mode",
                "Data": { "Status": "NOT_FOUND" },
            }),
        );
    }
}
