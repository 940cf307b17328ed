//! Schema Dependency Graph
//!
//! Builds a petgraph `DiGraph` over one publish batch and orders it so every
//! schema comes after the schemas it references. Only references to artifacts
//! present in the batch create edges; anything else is assumed to be
//! published already.
//!
//! Ordering is Kahn's algorithm with ties broken by batch position, so the
//! same input always yields the same order.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Result, SyncError};
use crate::schema::SchemaWithReferences;

/// Dependency graph over a batch. Node `i` is batch entry `i`; an edge
/// `a -> b` means `b` references `a`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
}

impl DependencyGraph {
    /// Build the graph for a batch
    pub fn build(batch: &[SchemaWithReferences]) -> Self {
        let mut graph = DiGraph::with_capacity(batch.len(), batch.len() * 2);
        let mut by_artifact: HashMap<&str, Vec<NodeIndex>> = HashMap::with_capacity(batch.len());

        for entry in batch {
            let idx = graph.add_node(entry.artifact_id.clone());
            by_artifact.entry(entry.artifact_id.as_str()).or_default().push(idx);
        }

        for (i, entry) in batch.iter().enumerate() {
            let dependent = NodeIndex::new(i);
            for artifact in entry.referenced_artifacts() {
                let Some(dependencies) = by_artifact.get(artifact) else {
                    continue;
                };
                for &dependency in dependencies {
                    // update_edge keeps the edge set free of duplicates
                    graph.update_edge(dependency, dependent, ());
                }
            }
        }

        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Batch positions of the in-batch schemas entry `index` depends on
    pub fn dependencies_of(&self, index: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), Direction::Incoming)
            .map(NodeIndex::index)
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Batch positions in publish order.
    ///
    /// On failure returns the positions that could not be ordered: every
    /// member of a cycle and everything blocked behind one.
    pub fn topological_order(&self) -> std::result::Result<Vec<usize>, Vec<usize>> {
        let n = self.graph.node_count();
        let mut in_degree: Vec<usize> = (0..n)
            .map(|i| {
                self.graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
                    .count()
            })
            .collect();

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(node);

            let mut dependents: Vec<usize> = self
                .graph
                .neighbors_directed(NodeIndex::new(node), Direction::Outgoing)
                .map(NodeIndex::index)
                .collect();
            dependents.sort_unstable();

            for dependent in dependents {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            let placed: HashSet<usize> = order.into_iter().collect();
            Err((0..n).filter(|i| !placed.contains(i)).collect())
        }
    }

    /// Groups of artifact ids that reference each other in a cycle
    pub fn cycle_groups(&self) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<usize>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
            })
            .map(|scc| {
                let mut members: Vec<usize> = scc.into_iter().map(NodeIndex::index).collect();
                members.sort_unstable();
                members
            })
            .collect();
        groups.sort_by_key(|members| members[0]);

        groups
            .into_iter()
            .map(|members| {
                members
                    .into_iter()
                    .map(|i| self.graph[NodeIndex::new(i)].clone())
                    .collect()
            })
            .collect()
    }
}

/// Order a batch so dependencies precede dependents.
///
/// Fails with [`SyncError::CircularDependency`] naming every artifact that
/// could not be ordered, in batch order.
pub fn order_by_dependencies(batch: Vec<SchemaWithReferences>) -> Result<Vec<SchemaWithReferences>> {
    let graph = DependencyGraph::build(&batch);

    match graph.topological_order() {
        Ok(order) => {
            let mut slots: Vec<Option<SchemaWithReferences>> = batch.into_iter().map(Some).collect();
            Ok(order
                .into_iter()
                .filter_map(|i| slots[i].take())
                .collect())
        }
        Err(unresolved) => {
            let mut seen = HashSet::new();
            let artifacts = unresolved
                .into_iter()
                .map(|i| batch[i].artifact_id.clone())
                .filter(|id| seen.insert(id.clone()))
                .collect();
            Err(SyncError::CircularDependency { artifacts })
        }
    }
}
