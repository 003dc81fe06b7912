//! Graph construction from a project.

use super::{DependencyGraph, GraphNode};
use crate::model::{EntityRef, NameIndex, Project, Reference, ReferenceTarget};
use crate::semantic::error::{SemanticError, SemanticResult};

impl DependencyGraph {
    /// Build the graph, failing on the first unresolvable reference.
    pub fn build(project: &Project) -> SemanticResult<Self> {
        let (graph, errors) = Self::build_collecting(project);
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(graph),
        }
    }

    /// Build the graph, collecting every reference error instead of
    /// stopping. References that fail to resolve produce no edge.
    pub fn build_collecting(project: &Project) -> (Self, Vec<SemanticError>) {
        let index = NameIndex::new(project);
        let mut graph = DependencyGraph::new();
        let mut errors = Vec::new();

        for (name, kinds) in index.duplicates() {
            errors.push(SemanticError::DuplicateName {
                name: name.to_string(),
                kinds: kinds.to_vec(),
            });
        }

        let entities = project.entities();
        for entity in &entities {
            graph.add_node(GraphNode {
                id: entity.id(),
                kind: entity.kind(),
                file_path: entity.file_path().map(|p| p.to_path_buf()),
            });
        }

        for entity in &entities {
            let id = entity.id();
            for reference in dependencies_of(project, entity) {
                match index.resolve(&reference) {
                    ReferenceTarget::Entity { id: target, .. } => graph.add_edge(&id, &target),
                    ReferenceTarget::Ambiguous { candidates } => {
                        errors.push(SemanticError::AmbiguousReference {
                            entity: id.clone(),
                            reference: reference.display_name(),
                            candidates,
                        })
                    }
                    ReferenceTarget::Unresolved => errors.push(SemanticError::UnresolvedReference {
                        entity: id.clone(),
                        reference: reference.display_name(),
                    }),
                }
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            errors = errors.len(),
            "built dependency graph"
        );
        (graph, errors)
    }
}

/// An entity's references plus the implicit default source of a model.
fn dependencies_of(project: &Project, entity: &EntityRef<'_>) -> Vec<Reference> {
    let mut refs = entity.references();
    if let EntityRef::Model(model) = entity {
        if !model.is_local_merge() && model.source.is_none() {
            if let Some(default) = &project.defaults.source_name {
                refs.push(Reference::Named {
                    name: default.clone(),
                    property: None,
                });
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, Metric, Model, Source, SourceKind};

    #[test]
    fn test_build_wires_references() {
        let project = Project::new("p")
            .with_default_source("db")
            .with_source(Source::new("db", SourceKind::DuckDb))
            .with_model(
                Model::sql("orders", "SELECT 1").with_metric(Metric::new("revenue", "SUM(x)")),
            )
            .with_metric(Metric::new("double", "2 * ${ref(orders).revenue}"));

        let graph = DependencyGraph::build(&project).unwrap();
        assert!(graph.has_edge("orders", "db"));
        assert!(graph.has_edge("orders.revenue", "orders"));
        assert!(graph.has_edge("double", "orders.revenue"));
        assert_eq!(graph.kind_of("orders.revenue"), Some(EntityKind::Metric));
    }

    #[test]
    fn test_unresolved_reference() {
        let project = Project::new("p").with_metric(Metric::new("m", "SUM(${ref(nope).x})"));
        let err = DependencyGraph::build(&project).unwrap_err();
        assert_eq!(
            err,
            SemanticError::UnresolvedReference {
                entity: "m".into(),
                reference: "nope.x".into()
            }
        );
    }

    #[test]
    fn test_collecting_reports_every_error() {
        let project = Project::new("p")
            .with_metric(Metric::new("a", "${ref(x)}"))
            .with_metric(Metric::new("b", "${ref(y)}"));
        let (_, errors) = DependencyGraph::build_collecting(&project);
        assert_eq!(errors.len(), 2);
    }
}
