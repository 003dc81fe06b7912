//! Join planning over declared relations.
//!
//! Models are nodes of an undirected graph; every relation is a candidate on
//! the edge between the two models its condition names. Several relations
//! may join the same pair; the one flagged `is_default` wins, then the first
//! declared.
//!
//! - Two models: shortest path by breadth-first search.
//! - Three or more: minimum spanning tree (unit weights, declaration order
//!   breaks ties) over relations between requested models. When those alone
//!   do not connect them, the tree grows from the root by repeatedly joining
//!   the closest unjoined requested model along a shortest path.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Bfs, EdgeRef};
use serde::Serialize;

use super::error::{SemanticError, SemanticResult};
use crate::model::{JoinType, Project, Relation};

/// One declared relation between a pair of models.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCandidate {
    pub relation: String,
    /// First model named in the condition.
    pub left: String,
    pub right: String,
    pub condition: String,
    pub join_type: JoinType,
    pub is_default: bool,
}

/// Edge weight: every relation joining the same pair, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationEdge {
    pub candidates: Vec<RelationCandidate>,
}

impl RelationEdge {
    /// The default candidate, else the first declared.
    pub fn preferred(&self) -> &RelationCandidate {
        self.candidates
            .iter()
            .find(|c| c.is_default)
            .unwrap_or(&self.candidates[0])
    }
}

/// One join of a join path. `left` is already part of the query when the
/// step is applied; `right` is the model being joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinStep {
    pub left: String,
    pub right: String,
    pub condition: String,
    /// Join kind as seen from `left`.
    pub join_type: JoinType,
    pub relation: String,
}

/// Non-fatal findings about the relation graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationWarning {
    /// A model no relation touches.
    IsolatedModel { model: String },
    /// More than one relation between the same pair claims to be the default.
    MultipleDefaults {
        models: (String, String),
        relations: Vec<String>,
    },
}

impl std::fmt::Display for RelationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationWarning::IsolatedModel { model } => write!(
                f,
                "Model '{}' is a disconnected component: no relation joins it to another model",
                model
            ),
            RelationWarning::MultipleDefaults { models, relations } => write!(
                f,
                "Models '{}' and '{}' have several default relations ({}); using '{}'",
                models.0,
                models.1,
                relations.join(", "),
                relations[0]
            ),
        }
    }
}

/// Parent information for path reconstruction.
/// Stores the parent node and the edge used to reach the current node.
struct ParentInfo {
    parent: NodeIndex,
    edge_idx: EdgeIndex,
}

/// Undirected graph of models joined by relations.
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    graph: UnGraph<String, RelationEdge>,
    index: HashMap<String, NodeIndex>,
}

impl RelationGraph {
    /// Build from every model and relation of a project.
    pub fn new(project: &Project) -> SemanticResult<Self> {
        let mut graph = RelationGraph::default();
        for model in &project.models {
            graph.add_model(&model.name);
        }
        for relation in &project.relations {
            graph.add_relation(relation)?;
        }
        tracing::debug!(
            models = graph.graph.node_count(),
            edges = graph.graph.edge_count(),
            "built relation graph"
        );
        Ok(graph)
    }

    fn add_model(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn add_relation(&mut self, relation: &Relation) -> SemanticResult<()> {
        let models = relation.models();
        if models.len() != 2 {
            return Err(SemanticError::InvalidRelation {
                relation: relation.name.clone(),
                models,
            });
        }
        let (left, right) = (&models[0], &models[1]);
        let endpoint = |name: &String| {
            self.index
                .get(name)
                .copied()
                .ok_or_else(|| SemanticError::UnresolvedReference {
                    entity: relation.name.clone(),
                    reference: name.clone(),
                })
        };
        let (a, b) = (endpoint(left)?, endpoint(right)?);

        let candidate = RelationCandidate {
            relation: relation.name.clone(),
            left: left.clone(),
            right: right.clone(),
            condition: relation.condition.clone(),
            join_type: relation.join_type,
            is_default: relation.is_default,
        };
        match self.graph.find_edge(a, b) {
            Some(edge) => self.graph[edge].candidates.push(candidate),
            None => {
                self.graph.add_edge(
                    a,
                    b,
                    RelationEdge {
                        candidates: vec![candidate],
                    },
                );
            }
        }
        Ok(())
    }

    pub fn contains(&self, model: &str) -> bool {
        self.index.contains_key(model)
    }

    /// Relations declared between two models, in declaration order.
    pub fn relations_between(&self, a: &str, b: &str) -> Vec<&RelationCandidate> {
        match (self.index.get(a), self.index.get(b)) {
            (Some(x), Some(y)) => self
                .graph
                .find_edge(*x, *y)
                .map(|e| self.graph[e].candidates.iter().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Joins needed to connect every model in `models`.
    ///
    /// The first model is the root: every step joins a new model onto one
    /// already in the query.
    pub fn find_join_path(&self, models: &[String]) -> SemanticResult<Vec<JoinStep>> {
        let mut requested: Vec<&str> = Vec::new();
        for model in models {
            if !requested.contains(&model.as_str()) {
                requested.push(model);
            }
        }
        if requested.len() <= 1 {
            return Ok(Vec::new());
        }

        let unknown: Vec<String> = requested
            .iter()
            .filter(|m| !self.contains(m))
            .map(|m| m.to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(no_join_path(&requested, unknown));
        }

        let nodes: Vec<NodeIndex> = requested.iter().map(|m| self.index[*m]).collect();
        let steps = if nodes.len() == 2 {
            self.shortest_path(nodes[0], nodes[1])
                .ok_or_else(|| no_join_path(&requested, vec![requested[1].to_string()]))?
        } else {
            self.spanning_tree(&requested, &nodes)?
        };

        tracing::debug!(
            models = ?requested,
            joins = steps.len(),
            "planned join path"
        );
        Ok(steps)
    }

    /// BFS with parent pointers.
    fn shortest_path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<JoinStep>> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut parents: HashMap<NodeIndex, ParentInfo> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            for (neighbor, edge_idx) in self.neighbors(current) {
                if !visited.insert(neighbor) {
                    continue;
                }
                parents.insert(
                    neighbor,
                    ParentInfo {
                        parent: current,
                        edge_idx,
                    },
                );
                if neighbor == to {
                    return Some(self.reconstruct_path(from, to, &parents));
                }
                queue.push_back(neighbor);
            }
        }
        None
    }

    /// Walks backward from destination to source, then reverses.
    fn reconstruct_path(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        parents: &HashMap<NodeIndex, ParentInfo>,
    ) -> Vec<JoinStep> {
        let mut steps = Vec::new();
        let mut current = to;
        while current != from {
            let info = &parents[&current];
            steps.push(self.step(info.parent, current, info.edge_idx));
            current = info.parent;
        }
        steps.reverse();
        steps
    }

    fn spanning_tree(
        &self,
        requested: &[&str],
        nodes: &[NodeIndex],
    ) -> SemanticResult<Vec<JoinStep>> {
        let root = nodes[0];
        let component = self.component_of(root);
        let unreachable: Vec<String> = requested
            .iter()
            .zip(nodes)
            .filter(|(_, idx)| !component.contains(*idx))
            .map(|(name, _)| name.to_string())
            .collect();
        if !unreachable.is_empty() {
            return Err(no_join_path(requested, unreachable));
        }

        if let Some(tree) = self.induced_tree(nodes) {
            return Ok(self.order_from_root(root, &tree));
        }

        let mut joined: Vec<NodeIndex> = vec![root];
        let mut pending: Vec<NodeIndex> = nodes[1..].to_vec();
        let mut steps = Vec::new();
        while !pending.is_empty() {
            let Some(path) = self.nearest_pending(&joined, &pending) else {
                let unreachable = pending.iter().map(|n| self.graph[*n].clone()).collect();
                return Err(no_join_path(requested, unreachable));
            };
            for (from, to, edge) in path {
                steps.push(self.step(from, to, edge));
                joined.push(to);
                pending.retain(|n| *n != to);
            }
        }
        Ok(steps)
    }

    /// Kruskal over the relations whose both ends are requested. Unit
    /// weights, so edge insertion order (declaration order) breaks ties.
    /// `None` when those relations alone leave the requested models apart.
    fn induced_tree(&self, nodes: &[NodeIndex]) -> Option<Vec<EdgeIndex>> {
        let keep: HashSet<NodeIndex> = nodes.iter().copied().collect();
        let mut sets = UnionFind::<usize>::new(self.graph.node_count());
        let mut tree: Vec<EdgeIndex> = Vec::new();
        for edge in self.graph.edge_indices() {
            let Some((a, b)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            if keep.contains(&a) && keep.contains(&b) && sets.union(a.index(), b.index()) {
                tree.push(edge);
            }
        }
        (tree.len() + 1 == keep.len()).then_some(tree)
    }

    /// Shortest path from any joined model to the closest pending one.
    ///
    /// The search stops at the first pending model it reaches, so the
    /// intermediate models on the returned path are never requested ones.
    fn nearest_pending(
        &self,
        joined: &[NodeIndex],
        pending: &[NodeIndex],
    ) -> Option<Vec<(NodeIndex, NodeIndex, EdgeIndex)>> {
        let mut visited: HashSet<NodeIndex> = joined.iter().copied().collect();
        let mut parents: HashMap<NodeIndex, ParentInfo> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = joined.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            for (neighbor, edge_idx) in self.neighbors(current) {
                if !visited.insert(neighbor) {
                    continue;
                }
                parents.insert(
                    neighbor,
                    ParentInfo {
                        parent: current,
                        edge_idx,
                    },
                );
                if pending.contains(&neighbor) {
                    let mut path = Vec::new();
                    let mut node = neighbor;
                    while let Some(info) = parents.get(&node) {
                        path.push((info.parent, node, info.edge_idx));
                        node = info.parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(neighbor);
            }
        }
        None
    }

    /// Order tree edges outward from the root.
    fn order_from_root(&self, root: NodeIndex, tree: &[EdgeIndex]) -> Vec<JoinStep> {
        let mut adjacency: HashMap<NodeIndex, Vec<(NodeIndex, EdgeIndex)>> = HashMap::new();
        for edge in tree {
            if let Some((a, b)) = self.graph.edge_endpoints(*edge) {
                adjacency.entry(a).or_default().push((b, *edge));
                adjacency.entry(b).or_default().push((a, *edge));
            }
        }
        let mut steps = Vec::with_capacity(tree.len());
        let mut seen: HashSet<NodeIndex> = HashSet::from([root]);
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for (next, edge) in adjacency.get(&current).into_iter().flatten() {
                if seen.insert(*next) {
                    steps.push(self.step(current, *next, *edge));
                    queue.push_back(*next);
                }
            }
        }
        steps
    }

    fn step(&self, from: NodeIndex, to: NodeIndex, edge: EdgeIndex) -> JoinStep {
        let left = self.graph[from].clone();
        let right = self.graph[to].clone();
        let candidate = self.graph[edge].preferred();
        let join_type = if candidate.left == left {
            candidate.join_type
        } else {
            candidate.join_type.flipped()
        };
        JoinStep {
            left,
            right,
            condition: candidate.condition.clone(),
            join_type,
            relation: candidate.relation.clone(),
        }
    }

    /// Neighbors with the connecting edge, in edge insertion order.
    fn neighbors(&self, node: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        let mut out: Vec<(NodeIndex, EdgeIndex)> = self
            .graph
            .edges(node)
            .filter_map(|edge| {
                let (a, b) = self.graph.edge_endpoints(edge.id())?;
                Some((if a == node { b } else { a }, edge.id()))
            })
            .collect();
        out.sort_by_key(|(_, edge)| edge.index());
        out
    }

    fn component_of(&self, start: NodeIndex) -> HashSet<NodeIndex> {
        let mut bfs = Bfs::new(&self.graph, start);
        let mut seen = HashSet::new();
        while let Some(node) = bfs.next(&self.graph) {
            seen.insert(node);
        }
        seen
    }

    /// Every model transitively joinable with `model`, excluding itself.
    pub fn get_connected_models(&self, model: &str) -> BTreeSet<String> {
        let Some(start) = self.index.get(model) else {
            return BTreeSet::new();
        };
        self.component_of(*start)
            .into_iter()
            .filter(|n| n != start)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Isolated models and conflicting default relations.
    ///
    /// Isolation is only reported once the project declares relations at all.
    pub fn validate(&self) -> Vec<RelationWarning> {
        let mut warnings = Vec::new();

        if self.graph.edge_count() > 0 {
            for node in self.graph.node_indices() {
                if self.graph.neighbors(node).next().is_none() {
                    warnings.push(RelationWarning::IsolatedModel {
                        model: self.graph[node].clone(),
                    });
                }
            }
        }

        for edge in self.graph.edge_indices() {
            let defaults: Vec<String> = self.graph[edge]
                .candidates
                .iter()
                .filter(|c| c.is_default)
                .map(|c| c.relation.clone())
                .collect();
            if defaults.len() > 1 {
                if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                    warnings.push(RelationWarning::MultipleDefaults {
                        models: (self.graph[a].clone(), self.graph[b].clone()),
                        relations: defaults,
                    });
                }
            }
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        warnings
    }
}

fn no_join_path(requested: &[&str], mut unreachable: Vec<String>) -> SemanticError {
    let mut models: Vec<String> = requested.iter().map(|m| m.to_string()).collect();
    models.sort();
    unreachable.sort();
    SemanticError::NoJoinPath {
        models,
        unreachable,
    }
}
