//! Traversal queries over the dependency graph.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::collections::{HashSet, VecDeque};

use super::{DependencyGraph, GraphNode};
use crate::model::EntityKind;

impl DependencyGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<EntityKind> {
        self.node(id).map(|n| n.kind)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Ids of every node of `kind`, sorted.
    pub fn nodes_of_kind(&self, kind: EntityKind) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .graph
            .node_weights()
            .filter(|n| n.kind == kind)
            .map(|n| n.id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Direct dependencies of `id`, sorted.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Direct dependents of `id`, sorted.
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(a), Some(b)) => self.graph.contains_edge(*a, *b),
            _ => false,
        }
    }

    pub fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Everything of `kind` that `from` transitively depends on, sorted.
    ///
    /// Without a starting node, every node of `kind` in the graph.
    pub fn descendants_of_type(&self, kind: EntityKind, from: Option<&str>) -> Vec<&str> {
        match from {
            Some(id) => self.reachable_of_kind(id, kind, Direction::Outgoing),
            None => self.nodes_of_kind(kind),
        }
    }

    /// Everything of `kind` that transitively depends on `id`, sorted.
    pub fn ancestors_of_type(&self, kind: EntityKind, id: &str) -> Vec<&str> {
        self.reachable_of_kind(id, kind, Direction::Incoming)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&str> = self
            .graph
            .neighbors_directed(*idx, direction)
            .map(|n| self.graph[n].id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn reachable_of_kind(&self, id: &str, kind: EntityKind, direction: Direction) -> Vec<&str> {
        let Some(start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        queue.push_back(*start);

        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, direction) {
                if !visited.insert(next) {
                    continue;
                }
                if self.graph[next].kind == kind {
                    found.push(self.graph[next].id.as_str());
                }
                queue.push_back(next);
            }
        }
        found.sort_unstable();
        found
    }
}
