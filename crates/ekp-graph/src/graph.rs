use std::collections::{BTreeMap, BTreeSet};

use ekp_openapi::{DeclaredResource, ResourceId};
use tracing::{debug, info};

use crate::{Edge, EdgeReason, GraphError, StackOutput};

type Adjacency = BTreeMap<ResourceId, BTreeSet<ResourceId>>;

/// An immutable, acyclic build graph.
#[derive(Clone, Debug)]
pub struct DeploymentGraph {
    resources: BTreeMap<ResourceId, DeclaredResource>,
    edges: BTreeMap<(ResourceId, ResourceId), BTreeSet<EdgeReason>>,
    predecessors: Adjacency,
    successors: Adjacency,
    waves: Vec<Vec<ResourceId>>,
    outputs: Vec<StackOutput>,
}

impl DeploymentGraph {
    pub(crate) fn new(
        resources: BTreeMap<ResourceId, DeclaredResource>,
        edges: BTreeMap<(ResourceId, ResourceId), BTreeSet<EdgeReason>>,
        outputs: Vec<StackOutput>,
    ) -> Result<Self, GraphError> {
        let mut predecessors: Adjacency = resources
            .keys()
            .map(|id| (id.clone(), BTreeSet::default()))
            .collect();
        let mut successors = predecessors.clone();
        for (predecessor, successor) in edges.keys() {
            if let Some(set) = predecessors.get_mut(successor) {
                set.insert(predecessor.clone());
            }
            if let Some(set) = successors.get_mut(predecessor) {
                set.insert(successor.clone());
            }
        }

        let waves = compute_waves(&predecessors, &successors)?;
        info!(
            resources = resources.len(),
            edges = edges.len(),
            waves = waves.len(),
            "finalized deployment graph",
        );

        Ok(Self {
            resources,
            edges,
            predecessors,
            successors,
            waves,
            outputs,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&DeclaredResource> {
        self.resources.get(id)
    }

    /// Resources in id order.
    pub fn resources(&self) -> impl Iterator<Item = &DeclaredResource> {
        self.resources.values()
    }

    pub fn has_edge(&self, predecessor: &ResourceId, successor: &ResourceId) -> bool {
        self.edges
            .contains_key(&(predecessor.clone(), successor.clone()))
    }

    pub fn reasons(
        &self,
        predecessor: &ResourceId,
        successor: &ResourceId,
    ) -> Option<&BTreeSet<EdgeReason>> {
        self.edges.get(&(predecessor.clone(), successor.clone()))
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge<'_>> {
        self.edges
            .iter()
            .map(|((predecessor, successor), reasons)| Edge {
                predecessor,
                successor,
                reasons,
            })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Direct predecessors of `id`.
    pub fn predecessors(&self, id: &ResourceId) -> impl Iterator<Item = &ResourceId> {
        self.predecessors.get(id).into_iter().flatten()
    }

    /// Direct successors of `id`.
    pub fn successors(&self, id: &ResourceId) -> impl Iterator<Item = &ResourceId> {
        self.successors.get(id).into_iter().flatten()
    }

    /// Groups of resources whose predecessors all sit in earlier groups.
    pub fn waves(&self) -> &[Vec<ResourceId>] {
        &self.waves
    }

    /// Provisioning order: waves flattened, ties broken by id.
    pub fn order(&self) -> Vec<&ResourceId> {
        self.waves.iter().flatten().collect()
    }

    /// Teardown order: every successor before its predecessors.
    pub fn teardown_order(&self) -> Vec<&ResourceId> {
        self.waves.iter().rev().flatten().collect()
    }

    pub fn outputs(&self) -> &[StackOutput] {
        &self.outputs
    }

    pub fn stacks(&self) -> BTreeSet<&str> {
        self.resources.keys().map(ResourceId::stack).collect()
    }

    /// Stacks each stack waits for, derived from edges crossing stacks.
    pub fn stack_dependencies(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut dependencies: BTreeMap<_, BTreeSet<_>> =
            self.stacks().into_iter().map(|stack| (stack, BTreeSet::default())).collect();
        for (predecessor, successor) in self.edges.keys() {
            if predecessor.stack() != successor.stack() {
                dependencies
                    .entry(successor.stack())
                    .or_default()
                    .insert(predecessor.stack());
            }
        }
        dependencies
    }
}

/// Kahn's algorithm, one wave at a time.
fn compute_waves(
    predecessors: &Adjacency,
    successors: &Adjacency,
) -> Result<Vec<Vec<ResourceId>>, GraphError> {
    let mut remaining: BTreeMap<&ResourceId, usize> = predecessors
        .iter()
        .map(|(id, set)| (id, set.len()))
        .collect();
    let mut waves = Vec::default();

    while !remaining.is_empty() {
        let wave: Vec<ResourceId> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&id, _)| id.clone())
            .collect();

        if wave.is_empty() {
            let stuck: BTreeSet<&ResourceId> = remaining.keys().copied().collect();
            return Err(GraphError::Cycle {
                path: find_cycle(&stuck, successors),
            });
        }

        for id in &wave {
            remaining.remove(id);
            for successor in successors.get(id).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(successor) {
                    *count -= 1;
                }
            }
        }

        debug!(wave = waves.len(), resources = wave.len(), "computed wave");
        waves.push(wave);
    }
    Ok(waves)
}

/// Walks the stuck subgraph depth-first until it closes a loop.
///
/// The returned path starts and ends with the same resource.
fn find_cycle(stuck: &BTreeSet<&ResourceId>, successors: &Adjacency) -> Vec<ResourceId> {
    #[derive(Copy, Clone, PartialEq, Eq)]
    enum Mark {
        Active,
        Done,
    }

    fn visit<'a>(
        id: &'a ResourceId,
        stuck: &BTreeSet<&ResourceId>,
        successors: &'a Adjacency,
        marks: &mut BTreeMap<&'a ResourceId, Mark>,
        path: &mut Vec<&'a ResourceId>,
    ) -> Option<Vec<ResourceId>> {
        marks.insert(id, Mark::Active);
        path.push(id);

        for next in successors.get(id).into_iter().flatten() {
            if !stuck.contains(next) {
                continue;
            }
            match marks.get(next) {
                Some(Mark::Active) => {
                    let start = path.iter().position(|&item| item == next).unwrap_or(0);
                    let mut cycle: Vec<_> = path[start..].iter().map(|&id| id.clone()).collect();
                    cycle.push(next.clone());
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = visit(next, stuck, successors, marks, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        marks.insert(id, Mark::Done);
        None
    }

    let mut marks = BTreeMap::default();
    for &id in stuck {
        if marks.contains_key(id) {
            continue;
        }
        // Resolve `id` inside `successors` so every reference shares its lifetime
        let Some((id, _)) = successors.get_key_value(id) else {
            continue;
        };
        let mut path = Vec::default();
        if let Some(cycle) = visit(id, stuck, successors, &mut marks, &mut path) {
            return cycle;
        }
    }
    stuck.iter().map(|&id| id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use ekp_openapi::ResourceKind;
    use serde_json::json;

    use super::*;
    use crate::GraphBuilder;

    fn resource(name: &str) -> DeclaredResource {
        DeclaredResource::new(
            ResourceId::new("Stack").child(name),
            ResourceKind::IamRole,
            name,
            json!({}),
        )
    }

    fn id(name: &str) -> ResourceId {
        ResourceId::new("Stack").child(name)
    }

    #[test]
    fn waves_respect_edges_and_break_ties_by_id() {
        let mut builder = GraphBuilder::new();
        for name in ["C", "B", "A", "D"] {
            builder.add(resource(name)).unwrap();
        }
        builder
            .depends_on(&id("D"), &id("B"))
            .depends_on(&id("B"), &id("C"));

        let graph = builder.finalize().unwrap();
        assert_eq!(
            graph.waves(),
            [
                vec![id("A"), id("C")],
                vec![id("B")],
                vec![id("D")],
            ],
        );
        assert_eq!(
            graph.teardown_order(),
            [&id("D"), &id("B"), &id("A"), &id("C")],
        );
        assert_eq!(graph.predecessors(&id("D")).collect::<Vec<_>>(), [&id("B")]);
        assert_eq!(graph.successors(&id("C")).collect::<Vec<_>>(), [&id("B")]);
    }

    #[test]
    fn cycles_are_reported_with_their_path() {
        let mut builder = GraphBuilder::new();
        for name in ["A", "B", "C", "Z"] {
            builder.add(resource(name)).unwrap();
        }
        builder
            .depends_on(&id("B"), &id("A"))
            .depends_on(&id("C"), &id("B"))
            .depends_on(&id("A"), &id("C"))
            .depends_on(&id("Z"), &id("C"));

        let error = builder.finalize().unwrap_err();
        assert_eq!(
            error,
            GraphError::Cycle {
                path: vec![id("A"), id("B"), id("C"), id("A")],
            },
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut builder = GraphBuilder::new();
        builder.add(resource("A")).unwrap();
        builder.depends_on(&id("A"), &id("A"));

        assert!(matches!(
            builder.finalize(),
            Err(GraphError::Cycle { path }) if path == [id("A"), id("A")],
        ));
    }

    #[test]
    fn cross_stack_edges_become_stack_dependencies() {
        let mut builder = GraphBuilder::new();
        builder.add(resource("Cluster")).unwrap();
        builder
            .add(DeclaredResource::new(
                ResourceId::new("NetworkStack").child("Vpc"),
                ResourceKind::Vpc,
                "vpc",
                json!({}),
            ))
            .unwrap();
        builder.depends_on(&id("Cluster"), &ResourceId::new("NetworkStack").child("Vpc"));

        let graph = builder.finalize().unwrap();
        let dependencies = graph.stack_dependencies();
        assert_eq!(dependencies["Stack"], BTreeSet::from(["NetworkStack"]));
        assert!(dependencies["NetworkStack"].is_empty());
    }
}
