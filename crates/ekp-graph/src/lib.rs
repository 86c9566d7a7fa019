mod builder;
mod edge;
mod error;
mod graph;
pub mod rules;
pub mod synth;
mod token;

pub use self::{
    builder::{GraphBuilder, StackOutput},
    edge::{Edge, EdgeReason},
    error::{GraphError, SynthError},
    graph::DeploymentGraph,
    rules::{Relation, Rule, RuleTable},
    synth::CloudAssembly,
};
