use ekp_graph::GraphBuilder;
use ekp_openapi::{DeclaredResource, ResourceId};
use serde::Serialize;
use serde_json::{json, Value};

use crate::ProvisionError;

/// Declares one part of the platform into a shared [`GraphBuilder`].
///
/// The output carries the ids later provisioners reference or order
/// themselves against.
pub trait Provisioner {
    type Output;

    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError>;
}

/// Kubernetes objects applied to one cluster under a common construct path.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Manifests<'a> {
    pub(crate) cluster: &'a ResourceId,
    pub(crate) scope: &'a ResourceId,
}

impl Manifests<'_> {
    pub(crate) fn object<K>(
        &self,
        name: &str,
        object: &K,
    ) -> Result<DeclaredResource, ProvisionError>
    where
        K: Serialize,
    {
        Ok(DeclaredResource::from_object(self.scope.child(name), object)?.on_cluster(self.cluster))
    }

    pub(crate) fn value(
        &self,
        name: &str,
        manifest: Value,
    ) -> Result<DeclaredResource, ProvisionError> {
        Ok(DeclaredResource::kubernetes(self.scope.child(name), manifest)?
            .on_cluster(self.cluster))
    }

    pub(crate) fn add<K>(
        &self,
        graph: &mut GraphBuilder,
        name: &str,
        object: &K,
    ) -> Result<ResourceId, ProvisionError>
    where
        K: Serialize,
    {
        graph.add(self.object(name, object)?).map_err(Into::into)
    }
}

pub(crate) fn policy_document(statements: Vec<Value>) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
}

/// A statement allowing `actions` on `resources`.
pub(crate) fn allow(actions: &[&str], resources: &[&str]) -> Value {
    json!({
        "Effect": "Allow",
        "Action": actions,
        "Resource": resources,
    })
}

/// Trust policy for a role assumed by an AWS service.
pub(crate) fn service_trust(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

/// Trust policy for a role assumed by pods through the cluster's OIDC provider.
pub(crate) fn web_identity_trust(oidc_provider: &ResourceId) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Federated": oidc_provider.attr("Arn") },
            "Action": "sts:AssumeRoleWithWebIdentity",
        }],
    })
}

pub(crate) fn managed_policy(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{name}")
}
