//! Dependency graph used to order and cycle-check registrations.
//!
//! Nodes are spec names; an edge `from → to` means `from` depends on `to`.
//! Output names never appear here: a dependency on an output is recorded as
//! an edge to the spec that declares it.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::core::{EngineError, Result};

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is on the current DFS path.
    Gray,
    /// Node and everything below it has been visited.
    Black,
}

/// Directed graph of spec names.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it is not present yet and return its index.
    pub fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    /// Record that `from` depends on `to`.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Fail with the full cycle path if the graph has a cycle.
    ///
    /// Nodes are visited in insertion order, so the reported path starts at
    /// the earliest-added node on the cycle that DFS reaches first.
    pub fn detect_cycles(&self) -> Result<()> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|node| (node, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if !matches!(colors.get(&node), Some(Color::White)) {
                continue;
            }
            if let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path) {
                let chain = cycle
                    .iter()
                    .map(|index| self.graph[*index].as_str())
                    .collect::<Vec<_>>()
                    .join(" → ");
                tracing::debug!(target: "registry", "Cycle found: {}", chain);
                return Err(EngineError::CircularDependency {
                    chain,
                });
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        // petgraph yields neighbors newest-edge first; walk them in declaration order.
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        neighbors.reverse();

        for neighbor in neighbors {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == neighbor)?;
                    let mut cycle = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Node names ordered so every dependency precedes its dependents.
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        self.detect_cycles()?;

        match toposort(&self.graph, None) {
            // toposort puts dependents before their dependencies
            Ok(indices) => {
                Ok(indices.into_iter().rev().map(|index| self.graph[index].clone()).collect())
            }
            Err(cycle) => Err(EngineError::CircularDependency {
                chain: self.graph[cycle.node_id()].clone(),
            }),
        }
    }
}
