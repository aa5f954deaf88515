//! Dependency graph and topological ordering for extensions.
//!
//! An extension that lists another in `required_extensions()` must be
//! applied after it. The sort is deterministic: among extensions with no
//! ordering constraint between them, names sort lexicographically.
//!
//! # Example
//!
//! ```
//! use rocker_extensions::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_node("user");
//! graph.add_node("pulse");
//! graph.add_edge("pulse", "user");
//!
//! let order = graph.topological_sort().unwrap();
//! assert_eq!(order, vec!["user", "pulse"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::extension::Extension;

/// Directed acyclic graph of extension requirements.
///
/// Edges point from dependent to dependency: if A requires B, the edge is
/// `A -> B`. Topological sort returns names in dependency-first order
/// (B before A).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// Adjacency list: key depends on each value.
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Create an empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a set of extensions and their declared requirements.
    pub fn from_extensions<'a>(extensions: impl IntoIterator<Item = &'a dyn Extension>) -> Self {
        let mut graph = Self::new();
        for ext in extensions {
            graph.add_node(ext.name());
            for dep in ext.required_extensions() {
                graph.add_edge(ext.name(), dep);
            }
        }
        graph
    }

    /// Add a node. Adding an existing name is a no-op.
    pub fn add_node(&mut self, id: &str) {
        self.nodes.insert(id.to_string());
        self.edges.entry(id.to_string()).or_default();
    }

    /// Declare that `from` depends on `to`.
    ///
    /// Edges to names that never become nodes are ignored by the sort;
    /// the registry reports those as missing before sorting.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// Perform a topological sort using Kahn's algorithm.
    ///
    /// Returns names in dependency-first order: if A depends on B, B
    /// appears before A in the result.
    ///
    /// # Errors
    ///
    /// Returns `Error::DependencyCycle` if the graph contains a cycle.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        // Remaining unsatisfied dependencies per node
        let mut pending: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|id| {
                let count = self
                    .edges
                    .get(id)
                    .map(|deps| deps.iter().filter(|d| self.nodes.contains(*d)).count())
                    .unwrap_or(0);
                (id.as_str(), count)
            })
            .collect();

        // Ready set is ordered, so the smallest name is always taken first
        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(current) = ready.pop_first() {
            result.push(current.to_string());
            pending.remove(current);

            for (from, deps) in &self.edges {
                if !deps.contains(current) {
                    continue;
                }
                if let Some(count) = pending.get_mut(from.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(from.as_str());
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let participants = pending.keys().map(|id| id.to_string()).collect();
            return Err(Error::DependencyCycle { participants });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        let sorted = graph.topological_sort().unwrap();
        assert!(sorted.is_empty());
    }

    #[test]
    fn test_linear_chain() {
        let mut graph = DependencyGraph::new();
        graph.add_node("user");
        graph.add_node("git");
        graph.add_edge("git", "user");

        let sorted = graph.topological_sort().unwrap();
        assert_eq!(sorted, vec!["user", "git"]);
    }

    #[test]
    fn test_dependency_beats_alphabetical_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node("alpha");
        graph.add_node("zulu");
        graph.add_edge("alpha", "zulu");

        assert_eq!(graph.topological_sort().unwrap(), vec!["zulu", "alpha"]);
    }

    #[test]
    fn test_diamond_dependency() {
        let mut graph = DependencyGraph::new();
        for id in ["base", "ext-a", "ext-b", "ext-top"] {
            graph.add_node(id);
        }
        graph.add_edge("ext-a", "base");
        graph.add_edge("ext-b", "base");
        graph.add_edge("ext-top", "ext-a");
        graph.add_edge("ext-top", "ext-b");

        let sorted = graph.topological_sort().unwrap();
        assert_eq!(sorted, vec!["base", "ext-a", "ext-b", "ext-top"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_node("b");
        graph.add_node("c");
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");

        let err = graph.topological_sort().unwrap_err();
        match err {
            Error::DependencyCycle { participants } => {
                assert_eq!(participants, vec!["a", "b"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_edge("a", "a");
        assert!(graph.topological_sort().is_err());
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut forward = DependencyGraph::new();
        let mut backward = DependencyGraph::new();
        for id in ["zebra", "alpha", "mid"] {
            forward.add_node(id);
        }
        for id in ["mid", "alpha", "zebra"] {
            backward.add_node(id);
        }

        assert_eq!(
            forward.topological_sort().unwrap(),
            backward.topological_sort().unwrap()
        );
        assert_eq!(
            forward.topological_sort().unwrap(),
            vec!["alpha", "mid", "zebra"]
        );
    }
}
