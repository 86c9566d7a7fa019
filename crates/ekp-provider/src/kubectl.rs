use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{DeclaredResource, ResourceId, ResourceKind};
use serde_json::json;
use tracing::{instrument, Level};

use crate::{consts, ProvisionError, Provisioner};

const COMPATIBLE_RUNTIMES: &[&str] = &["python3.11", "python3.10", "python3.9", "nodejs18.x"];

#[derive(Clone, Debug)]
pub struct KubectlLayer {
    pub layer: ResourceId,
}

/// The Lambda layer carrying `kubectl` for the cluster's manifest handler.
pub struct KubectlLayerProvisioner<'a> {
    pub account: &'a str,
    pub region: &'a str,
}

impl Provisioner for KubectlLayerProvisioner<'_> {
    type Output = KubectlLayer;

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let layer = graph.add(DeclaredResource::new(
            ResourceId::new(consts::STACK_KUBECTL_LAYER).child("KubectlLayer"),
            ResourceKind::LayerVersion,
            "kubectl",
            json!({
                "CompatibleRuntimes": COMPATIBLE_RUNTIMES,
                "Content": {
                    "S3Bucket": format!("ekp-assets-{}-{}", self.account, self.region),
                    "S3Key": "kubectl-layer.zip",
                },
                "Description": "A layer that contains kubectl",
            }),
        ))?;

        graph.output(StackOutput::new(
            consts::STACK_KUBECTL_LAYER,
            "KubectlLayerArn",
            layer.attr("Ref"),
            "ARN of the kubectl Lambda layer",
        ));
        Ok(KubectlLayer { layer })
    }
}
