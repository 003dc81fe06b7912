//! Semantic validation of a project's dependency graph.
//!
//! Rules, in the order they run:
//!
//! 1. Nested metrics and dimensions may not use `ref()` syntax (checked on
//!    the entities, before the graph exists).
//! 2. Reference kinds: metric -> {metric, dimension, model}, dimension ->
//!    {dimension, model}, relation -> {model}, and a relation joins exactly
//!    two models.
//! 3. No cycles among metrics and dimensions, nor anywhere else in the graph.
//! 4. Every metric and dimension ties back to exactly one base model and
//!    exactly one source.
//!
//! [`validate_project`] runs everything and returns every error found.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::error::SemanticError;
use super::graph::DependencyGraph;
use crate::model::reference::contains_ref_syntax;
use crate::model::{EntityKind, EntityRef, Project};

/// Prefix of the synthetic source of a model run by the embedded engine.
pub const LOCAL_SOURCE_PREFIX: &str = "local:";

/// Build and validate the dependency graph of `project`.
pub fn validate_project(project: &Project) -> Result<DependencyGraph, Vec<SemanticError>> {
    let mut errors = validate_nested_syntax(project);

    let (graph, build_errors) = DependencyGraph::build_collecting(project);
    errors.extend(build_errors);

    errors.extend(Validator::new(&graph).validate());

    if errors.is_empty() {
        Ok(graph)
    } else {
        Err(errors)
    }
}

/// Reject `ref()` syntax inside metrics and dimensions declared in a model.
pub fn validate_nested_syntax(project: &Project) -> Vec<SemanticError> {
    project
        .entities()
        .into_iter()
        .filter(EntityRef::is_nested)
        .filter_map(|entity| {
            let expression = entity.expression()?;
            contains_ref_syntax(expression).then(|| SemanticError::NestedReference {
                entity: entity.id(),
                expression: expression.to_string(),
            })
        })
        .collect()
}

/// Allowed dependency kinds per entity kind. `None` means unrestricted.
fn allowed_targets(kind: EntityKind) -> Option<&'static [EntityKind]> {
    match kind {
        EntityKind::Metric => Some(&[EntityKind::Metric, EntityKind::Dimension, EntityKind::Model]),
        EntityKind::Dimension => Some(&[EntityKind::Dimension, EntityKind::Model]),
        EntityKind::Relation => Some(&[EntityKind::Model]),
        _ => None,
    }
}

/// Graph-level rules over a built [`DependencyGraph`].
pub struct Validator<'g> {
    graph: &'g DependencyGraph,
    base_models: HashMap<String, BTreeSet<String>>,
}

impl<'g> Validator<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            base_models: HashMap::new(),
        }
    }

    /// Run every graph rule and collect all violations.
    pub fn validate(&mut self) -> Vec<SemanticError> {
        let mut errors = self.check_reference_kinds();

        let cycles = self.find_cycles();
        let acyclic = cycles.is_empty();
        errors.extend(cycles);

        // Ownership answers are meaningless on a cyclic graph.
        if acyclic {
            errors.extend(self.check_ownership());
        }
        errors
    }

    /// Reference-kind rules and relation arity.
    pub fn check_reference_kinds(&self) -> Vec<SemanticError> {
        let mut errors = Vec::new();
        for kind in [EntityKind::Metric, EntityKind::Dimension, EntityKind::Relation] {
            let Some(allowed) = allowed_targets(kind) else {
                continue;
            };
            for id in self.graph.nodes_of_kind(kind) {
                for target in self.graph.successors(id) {
                    let Some(target_kind) = self.graph.kind_of(target) else {
                        continue;
                    };
                    if !allowed.contains(&target_kind) {
                        errors.push(SemanticError::InvalidReferenceKind {
                            entity: id.to_string(),
                            entity_kind: kind,
                            target: target.to_string(),
                            target_kind,
                        });
                    }
                }
            }
        }

        for id in self.graph.nodes_of_kind(EntityKind::Relation) {
            let models: Vec<String> = self
                .graph
                .successors(id)
                .into_iter()
                .filter(|t| self.graph.kind_of(t) == Some(EntityKind::Model))
                .map(str::to_string)
                .collect();
            if models.len() != 2 {
                errors.push(SemanticError::InvalidRelation {
                    relation: id.to_string(),
                    models,
                });
            }
        }
        errors
    }

    /// Cycles among metrics and dimensions, then anywhere in the graph.
    ///
    /// Each cycle is reported once, as the path from its first node back to
    /// itself. A self-reference is the one-node cycle `[m, m]`.
    pub fn find_cycles(&self) -> Vec<SemanticError> {
        let expressions = |kind: EntityKind| {
            matches!(kind, EntityKind::Metric | EntityKind::Dimension)
        };
        let mut cycles = self.cycles_within(&expressions);
        if cycles.is_empty() && !self.graph.is_acyclic() {
            cycles = self.cycles_within(&|_| true);
        }
        cycles
            .into_iter()
            .map(|cycle| SemanticError::CircularDependency { cycle })
            .collect()
    }

    fn cycles_within(&self, include: &dyn Fn(EntityKind) -> bool) -> Vec<Vec<String>> {
        let mut roots: Vec<&str> = Vec::new();
        for kind in [
            EntityKind::Metric,
            EntityKind::Dimension,
            EntityKind::Model,
            EntityKind::Source,
            EntityKind::Relation,
            EntityKind::Trace,
        ] {
            if include(kind) {
                roots.extend(self.graph.nodes_of_kind(kind));
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut cycles = Vec::new();
        for root in roots {
            let mut path = Vec::new();
            if let Some(cycle) = self.detect_cycle(root, include, &mut visited, &mut path) {
                cycles.push(cycle);
            }
        }
        cycles
    }

    fn detect_cycle(
        &self,
        node: &str,
        include: &dyn Fn(EntityKind) -> bool,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(start) = path.iter().position(|n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }

        if visited.contains(node) {
            return None;
        }

        visited.insert(node.to_string());
        path.push(node.to_string());

        for dep in self.graph.successors(node) {
            if !self.graph.kind_of(dep).is_some_and(include) {
                continue;
            }
            if let Some(cycle) = self.detect_cycle(dep, include, visited, path) {
                return Some(cycle);
            }
        }

        path.pop();
        None
    }

    /// Single-base-model and single-source rules for every metric and dimension.
    pub fn check_ownership(&mut self) -> Vec<SemanticError> {
        let graph = self.graph;
        let mut ids = graph.nodes_of_kind(EntityKind::Metric);
        ids.extend(graph.nodes_of_kind(EntityKind::Dimension));

        let mut errors = Vec::new();
        for id in ids {
            let models = self.base_models(id);
            match models.len() {
                0 => {
                    errors.push(SemanticError::NoBaseModel {
                        entity: id.to_string(),
                    });
                    continue;
                }
                1 => {}
                _ => errors.push(SemanticError::MultipleBaseModels {
                    entity: id.to_string(),
                    models: models.iter().cloned().collect(),
                }),
            }

            let sources: BTreeSet<String> = models
                .iter()
                .flat_map(|model| self.model_sources(model))
                .collect();
            match sources.len() {
                0 => errors.push(SemanticError::NoSource {
                    entity: id.to_string(),
                }),
                1 => {}
                _ => errors.push(SemanticError::MultipleSources {
                    entity: id.to_string(),
                    sources: sources.into_iter().collect(),
                }),
            }
        }
        errors
    }

    /// Base models reachable from a metric or dimension, memoized per node.
    pub fn base_models(&mut self, id: &str) -> BTreeSet<String> {
        let mut visiting = HashSet::new();
        self.collect_models(id, &mut visiting)
    }

    fn collect_models(&mut self, id: &str, visiting: &mut HashSet<String>) -> BTreeSet<String> {
        if let Some(models) = self.base_models.get(id) {
            return models.clone();
        }
        if !visiting.insert(id.to_string()) {
            return BTreeSet::new();
        }

        let graph = self.graph;
        let mut models = BTreeSet::new();
        for dep in graph.successors(id) {
            match graph.kind_of(dep) {
                Some(EntityKind::Model) => {
                    models.insert(dep.to_string());
                }
                Some(EntityKind::Metric | EntityKind::Dimension) => {
                    models.extend(self.collect_models(dep, visiting));
                }
                _ => {}
            }
        }

        self.base_models.insert(id.to_string(), models.clone());
        models
    }

    /// Sources a model runs against. A model built from other models runs
    /// on the embedded engine and is its own source.
    pub fn model_sources(&self, model: &str) -> BTreeSet<String> {
        let deps = self.graph.successors(model);
        if deps
            .iter()
            .any(|d| self.graph.kind_of(d) == Some(EntityKind::Model))
        {
            return BTreeSet::from([format!("{}{}", LOCAL_SOURCE_PREFIX, model)]);
        }
        deps.into_iter()
            .filter(|d| self.graph.kind_of(d) == Some(EntityKind::Source))
            .map(str::to_string)
            .collect()
    }
}
