//! Dependency graph over every project entity.
//!
//! One node per source, model, metric, dimension (nested ones included,
//! under the id `model.name`), relation and trace. An edge `a -> b` means
//! "a depends on b". The graph owns no entities: it is a derived index,
//! rebuilt from the [`Project`](crate::model::Project) on every compile.

mod builder;
pub mod query;

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::model::EntityKind;

/// A node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Entity id: its name, or `model.name` for nested metrics and dimensions.
    pub id: String,
    pub kind: EntityKind,
    /// Declaring file, for diagnostics.
    pub file_path: Option<PathBuf>,
}

/// Directed "depends on" graph of project entities.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<GraphNode, ()>,

    /// Index: entity id → NodeIndex
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(idx) = self.index.get(&node.id) {
            return *idx;
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        idx
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        if let (Some(a), Some(b)) = (self.index.get(from), self.index.get(to)) {
            self.graph.update_edge(*a, *b, ());
        }
    }
}
