//! Renders a finalized graph into one template per stack.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use ekp_openapi::{DeclaredResource, ResourceId};
use inflector::cases::pascalcase::to_pascal_case;
use itertools::Itertools;
use serde_json::{json, Map, Value};
use tracing::{info, instrument, Level};

use crate::{
    token::{self, Fragment, Token},
    DeploymentGraph, SynthError,
};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// The logical id of a resource inside its stack's template.
pub fn logical_id(id: &ResourceId) -> String {
    id.segments().map(to_pascal_case).join("")
}

/// Export name used for values read from another stack.
pub fn export_name(id: &ResourceId, attribute: &str) -> String {
    format!("{}:{}{attribute}", id.stack(), logical_id(id))
}

#[derive(Clone, Debug, PartialEq)]
pub struct CloudAssembly {
    pub templates: BTreeMap<String, Value>,
    pub manifest: Value,
}

impl CloudAssembly {
    #[instrument(level = Level::INFO, skip_all, err(Display))]
    pub fn synthesize(graph: &DeploymentGraph) -> Result<Self, SynthError> {
        let logical_ids = assign_logical_ids(graph)?;
        let mut renderer = Renderer {
            logical_ids: &logical_ids,
            exports: BTreeMap::default(),
        };

        let mut templates: BTreeMap<String, Value> = BTreeMap::default();
        let mut resources: BTreeMap<&str, Map<String, Value>> = BTreeMap::default();
        for resource in graph.resources() {
            let stack = resource.stack();
            let depends_on: BTreeSet<&str> = graph
                .predecessors(&resource.id)
                .filter(|predecessor| predecessor.stack() == stack)
                .filter_map(|predecessor| logical_ids.get(predecessor).map(String::as_str))
                .collect();

            let mut entry = Map::default();
            entry.insert("Type".into(), resource.kind.type_name().into());
            entry.insert(
                "Properties".into(),
                renderer.render(stack, &properties(resource)?),
            );
            if !depends_on.is_empty() {
                entry.insert("DependsOn".into(), json!(depends_on));
            }
            entry.insert("Metadata".into(), json!({ "ekp:path": resource.id }));

            resources
                .entry(stack)
                .or_default()
                .insert(logical_ids[&resource.id].clone(), Value::Object(entry));
        }

        let mut outputs: BTreeMap<&str, Map<String, Value>> = BTreeMap::default();
        for output in graph.outputs() {
            let value = renderer.render(&output.stack, &Value::String(output.value.clone()));
            outputs.entry(output.stack.as_str()).or_default().insert(
                to_pascal_case(&output.name),
                json!({ "Value": value, "Description": output.description }),
            );
        }
        for ((id, attribute), name) in &renderer.exports {
            outputs.entry(id.stack()).or_default().insert(
                format!("Export{}{attribute}", logical_ids[id]),
                json!({
                    "Value": attribute_of(&logical_ids[id], attribute),
                    "Export": { "Name": name },
                }),
            );
        }

        for stack in graph.stacks() {
            let mut template = Map::default();
            template.insert(
                "AWSTemplateFormatVersion".into(),
                TEMPLATE_FORMAT_VERSION.into(),
            );
            template.insert(
                "Resources".into(),
                Value::Object(resources.remove(stack).unwrap_or_default()),
            );
            if let Some(outputs) = outputs.remove(stack) {
                template.insert("Outputs".into(), Value::Object(outputs));
            }
            templates.insert(stack.to_string(), Value::Object(template));
        }

        let stacks: Map<String, Value> = graph
            .stack_dependencies()
            .into_iter()
            .map(|(stack, dependencies)| {
                let entry = json!({
                    "template": template_file_name(stack),
                    "dependencies": dependencies,
                });
                (stack.to_string(), entry)
            })
            .collect();
        let manifest = json!({
            "stacks": stacks,
            "waves": graph.waves(),
        });

        info!(stacks = templates.len(), "synthesized cloud assembly");
        Ok(Self {
            templates,
            manifest,
        })
    }

    /// Writes `<Stack>.template.json` per stack and `manifest.json`.
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, SynthError> {
        let write = |path: PathBuf, value: &Value| -> Result<PathBuf, SynthError> {
            let contents = ::serde_json::to_string_pretty(value)?;
            fs::write(&path, contents).map_err(|source| SynthError::Write {
                path: path.clone(),
                source,
            })?;
            Ok(path)
        };

        fs::create_dir_all(dir).map_err(|source| SynthError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut written = self
            .templates
            .iter()
            .map(|(stack, template)| write(dir.join(template_file_name(stack)), template))
            .collect::<Result<Vec<_>, _>>()?;
        written.push(write(dir.join(MANIFEST_FILE_NAME), &self.manifest)?);
        Ok(written)
    }
}

pub fn template_file_name(stack: &str) -> String {
    format!("{stack}.template.json")
}

fn assign_logical_ids(graph: &DeploymentGraph) -> Result<BTreeMap<ResourceId, String>, SynthError> {
    let mut seen: BTreeMap<(&str, String), &ResourceId> = BTreeMap::default();
    let mut logical_ids = BTreeMap::default();
    for resource in graph.resources() {
        let logical_id = logical_id(&resource.id);
        if let Some(&first) = seen.get(&(resource.stack(), logical_id.clone())) {
            return Err(SynthError::DuplicateLogicalId {
                logical_id,
                first: first.clone(),
                second: resource.id.clone(),
            });
        }
        seen.insert((resource.stack(), logical_id.clone()), &resource.id);
        logical_ids.insert(resource.id.clone(), logical_id);
    }
    Ok(logical_ids)
}

/// Template properties; Kubernetes manifests are embedded as a JSON string.
fn properties(resource: &DeclaredResource) -> Result<Value, SynthError> {
    if !resource.kind.is_kubernetes() {
        return Ok(resource.spec.clone());
    }

    let mut properties = Map::default();
    if let Some(cluster) = &resource.cluster {
        properties.insert("ClusterName".into(), cluster.attr("Ref").into());
    }
    properties.insert(
        "Manifest".into(),
        ::serde_json::to_string(&[&resource.spec])?.into(),
    );
    Ok(Value::Object(properties))
}

fn attribute_of(logical_id: &str, attribute: &str) -> Value {
    match attribute {
        "Ref" => json!({ "Ref": logical_id }),
        _ => json!({ "Fn::GetAtt": [logical_id, attribute] }),
    }
}

struct Renderer<'a> {
    logical_ids: &'a BTreeMap<ResourceId, String>,
    exports: BTreeMap<(ResourceId, String), String>,
}

impl Renderer<'_> {
    fn render(&mut self, stack: &str, value: &Value) -> Value {
        match value {
            Value::String(s) => self.render_str(stack, s),
            Value::Array(items) => items.iter().map(|item| self.render(stack, item)).collect(),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.render(stack, item)))
                    .collect(),
            ),
            Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        }
    }

    fn render_str(&mut self, stack: &str, value: &str) -> Value {
        let mut fragments = token::split(value);
        match fragments.len() {
            0 => Value::String(String::default()),
            1 => match fragments.remove(0) {
                Fragment::Literal(literal) => literal.into(),
                Fragment::Token(token) => self.render_token(stack, token),
            },
            _ => json!({
                "Fn::Join": [
                    "",
                    fragments
                        .into_iter()
                        .map(|fragment| match fragment {
                            Fragment::Literal(literal) => literal.into(),
                            Fragment::Token(token) => self.render_token(stack, token),
                        })
                        .collect::<Vec<Value>>(),
                ],
            }),
        }
    }

    fn render_token(&mut self, stack: &str, Token { id, attribute }: Token) -> Value {
        let Some(logical_id) = self.logical_ids.get(&id) else {
            // Unresolved tokens were rejected by `finalize`
            return format!("${{{id}.{attribute}}}").into();
        };

        if id.stack() == stack {
            attribute_of(logical_id, &attribute)
        } else {
            let name = export_name(&id, &attribute);
            self.exports.insert((id, attribute), name.clone());
            json!({ "Fn::ImportValue": name })
        }
    }
}

#[cfg(test)]
mod tests {
    use ekp_openapi::{k8s, ResourceKind};

    use super::*;
    use crate::GraphBuilder;

    fn graph() -> DeploymentGraph {
        let vpc = ResourceId::new("NetworkStack").child("EksVpc");
        let cluster = ResourceId::new("EksClusterStack").child("Cluster");

        let mut builder = GraphBuilder::new();
        builder
            .add(DeclaredResource::new(
                vpc.clone(),
                ResourceKind::Vpc,
                "NetworkStack-vpc",
                json!({ "CidrBlock": "10.0.0.0/16" }),
            ))
            .unwrap();
        builder
            .add(DeclaredResource::new(
                cluster.clone(),
                ResourceKind::Cluster,
                "dev-eks-automode",
                json!({ "ResourcesVpcConfig": { "VpcId": vpc.attr("VpcId") } }),
            ))
            .unwrap();
        builder
            .add(
                DeclaredResource::from_object(
                    cluster.child("MonitoringNamespace"),
                    &k8s::namespace("monitoring"),
                )
                .unwrap()
                .on_cluster(&cluster),
            )
            .unwrap();
        builder.finalize().unwrap()
    }

    #[test]
    fn logical_ids_drop_the_stack_and_pascal_case_segments() {
        assert_eq!(
            logical_id(&ResourceId::from("EksClusterStack/default-fargate-profile/Resource")),
            "DefaultFargateProfileResource",
        );
    }

    #[test]
    fn cross_stack_references_become_imports() {
        let assembly = CloudAssembly::synthesize(&graph()).unwrap();

        let cluster = &assembly.templates["EksClusterStack"]["Resources"]["Cluster"];
        assert_eq!(
            cluster["Properties"]["ResourcesVpcConfig"]["VpcId"],
            json!({ "Fn::ImportValue": "NetworkStack:EksVpcVpcId" }),
        );
        assert_eq!(
            assembly.templates["NetworkStack"]["Outputs"]["ExportEksVpcVpcId"]["Export"]["Name"],
            "NetworkStack:EksVpcVpcId",
        );
        assert_eq!(
            assembly.manifest["stacks"]["EksClusterStack"]["dependencies"],
            json!(["NetworkStack"]),
        );
    }

    #[test]
    fn manifests_depend_on_their_cluster_within_the_stack() {
        let assembly = CloudAssembly::synthesize(&graph()).unwrap();
        let namespace =
            &assembly.templates["EksClusterStack"]["Resources"]["ClusterMonitoringNamespace"];

        assert_eq!(namespace["Type"], "Custom::AWSCDK-EKS-KubernetesResource");
        assert_eq!(namespace["DependsOn"], json!(["Cluster"]));
        assert_eq!(
            namespace["Properties"]["ClusterName"],
            json!({ "Ref": "Cluster" }),
        );
        let manifest: Value =
            ::serde_json::from_str(namespace["Properties"]["Manifest"].as_str().unwrap()).unwrap();
        assert_eq!(manifest[0]["metadata"]["name"], "monitoring");
    }

    #[test]
    fn writes_one_template_per_stack() {
        let dir = ::std::env::temp_dir().join(format!("ekp-synth-{}", ::std::process::id()));
        let written = CloudAssembly::synthesize(&graph())
            .unwrap()
            .write_to(&dir)
            .unwrap();

        let names: Vec<_> = written
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(
            names,
            [
                "EksClusterStack.template.json",
                "NetworkStack.template.json",
                "manifest.json",
            ],
        );
        fs::remove_dir_all(&dir).unwrap();
    }
}
