//! Ordering graph management using `petgraph`.
//!
//! Nodes are added in declaration rank. Topological order is stable: among
//! nodes that are ready at the same time, the lowest rank comes first.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use modstack_common::error::{ModstackError, Result};
use petgraph::Direction;
use petgraph::graph::NodeIndex;

#[derive(Debug, Clone)]
struct Node {
    name: String,
    module: String,
}

/// A directed ordering graph. An edge `a -> b` means `a` comes first.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: petgraph::Graph<Node, ()>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node owned by `module`. Insertion order is the tie-break rank.
    pub fn add_node(&mut self, name: impl Into<String>, module: impl Into<String>) -> NodeIndex {
        self.graph.add_node(Node {
            name: name.into(),
            module: module.into(),
        })
    }

    /// Requires `first` to come before `then`. Self edges are ignored.
    pub fn add_ordering(&mut self, first: NodeIndex, then: NodeIndex) {
        if first != then {
            let _ = self.graph.update_edge(first, then, ());
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns node names in a stable topological order.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::DependencyCycle`] naming the modules owning
    /// the nodes of every cycle, sorted.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            let node = NodeIndex::new(idx);
            order.push(self.graph[node].name.clone());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        if order.len() == self.graph.node_count() {
            return Ok(order);
        }
        Err(ModstackError::DependencyCycle {
            modules: self.cycle_modules(),
        })
    }

    fn cycle_modules(&self) -> Vec<String> {
        let modules: BTreeSet<String> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .map(|idx| self.graph[idx].module.clone())
            .collect();
        modules.into_iter().collect()
    }
}
