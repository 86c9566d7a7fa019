use std::collections::BTreeMap;

use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{DeclaredResource, ResourceId, ResourceKind};
use serde_json::json;
use tracing::{instrument, Level};

use crate::{consts, ProvisionError, Provisioner};

#[derive(Clone, Debug, Default)]
pub struct Registry {
    /// Repository name to resource id.
    pub repositories: BTreeMap<String, ResourceId>,
}

impl Registry {
    /// Image reference of the latest tag pushed to `name`.
    pub fn image(account: &str, region: &str, name: &str) -> String {
        format!("{account}.dkr.ecr.{region}.amazonaws.com/{name}:latest")
    }
}

pub struct RegistryProvisioner<'a> {
    pub repository_names: &'a [&'a str],
}

impl Provisioner for RegistryProvisioner<'_> {
    type Output = Registry;

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let stack = ResourceId::new(consts::STACK_ECR);

        let mut registry = Registry::default();
        for &name in self.repository_names {
            let construct = name.replace('-', "");
            let repository = graph.add(DeclaredResource::new(
                stack.child(&format!("{construct}Repo")),
                ResourceKind::Repository,
                name,
                json!({
                    "RepositoryName": name,
                    "EmptyOnDelete": true,
                }),
            ))?;

            graph.output(StackOutput::new(
                consts::STACK_ECR,
                &format!("{construct}RepoUri"),
                repository.attr("RepositoryUri"),
                format!("URI for the {name} ECR repository"),
            ));
            registry.repositories.insert(name.into(), repository);
        }
        Ok(registry)
    }
}
