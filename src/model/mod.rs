//! Project entities: sources, models, metrics, dimensions, relations and traces.
//!
//! Entities are plain immutable data. Everything that depends on how they
//! reference each other (the dependency graph, resolution caches) is derived
//! from a [`Project`] and rebuilt from scratch on every compile.

pub mod dimension;
pub mod index;
pub mod metric;
pub mod reference;
pub mod relation;
pub mod source;
pub mod table;
pub mod trace;

pub use dimension::Dimension;
pub use index::{NameIndex, ReferenceTarget};
pub use metric::Metric;
pub use reference::{extract_refs, ref_name, RefToken};
pub use relation::{JoinType, Relation};
pub use source::{Source, SourceKind};
pub use table::{Model, ModelKind};
pub use trace::{PropValue, Trace};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Project-wide defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    /// Source used by models that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

/// The full entity set of one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub models: Vec<Model>,
    /// Standalone metrics.
    #[serde(default)]
    pub metrics: Vec<Metric>,
    /// Standalone dimensions.
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub traces: Vec<Trace>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.defaults.source_name = Some(ref_name(&source.into()));
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.traces.push(trace);
        self
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn trace(&self, name: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.name == name)
    }

    /// Name of the source a model runs against: its own, else the project default.
    pub fn source_name_for(&self, model: &Model) -> Option<String> {
        model
            .source_name()
            .or_else(|| self.defaults.source_name.clone())
    }

    pub fn source_for_model(&self, model: &Model) -> Option<&Source> {
        self.source_name_for(model)
            .and_then(|name| self.source(&name))
    }

    /// Every entity, nested metrics and dimensions included, in a stable order.
    pub fn entities(&self) -> Vec<EntityRef<'_>> {
        let mut out: Vec<EntityRef<'_>> = Vec::new();
        out.extend(self.sources.iter().map(EntityRef::Source));
        for model in &self.models {
            out.push(EntityRef::Model(model));
            out.extend(model.metrics.iter().map(|metric| EntityRef::Metric {
                metric,
                parent: Some(model),
            }));
            out.extend(model.dimensions.iter().map(|dimension| EntityRef::Dimension {
                dimension,
                parent: Some(model),
            }));
        }
        out.extend(self.metrics.iter().map(|metric| EntityRef::Metric {
            metric,
            parent: None,
        }));
        out.extend(self.dimensions.iter().map(|dimension| EntityRef::Dimension {
            dimension,
            parent: None,
        }));
        out.extend(self.relations.iter().map(EntityRef::Relation));
        out.extend(self.traces.iter().map(EntityRef::Trace));
        out
    }
}

/// The six entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Source,
    Model,
    Metric,
    Dimension,
    Relation,
    Trace,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Source => "source",
            EntityKind::Model => "model",
            EntityKind::Metric => "metric",
            EntityKind::Dimension => "dimension",
            EntityKind::Relation => "relation",
            EntityKind::Trace => "trace",
        };
        write!(f, "{}", name)
    }
}

/// One outgoing reference of an entity, before name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Implicit parent of a nested metric or dimension.
    Parent(String),
    /// A named reference, from a `ref()` field or a `${ref(...)}` token.
    Named {
        name: String,
        property: Option<String>,
    },
}

impl Reference {
    fn named(name: impl Into<String>) -> Self {
        Reference::Named {
            name: name.into(),
            property: None,
        }
    }

    fn from_token(token: RefToken) -> Self {
        Reference::Named {
            name: token.name,
            property: token.property,
        }
    }

    /// Text used in diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            Reference::Parent(name) => name.clone(),
            Reference::Named {
                name,
                property: Some(property),
            } => format!("{}.{}", name, property),
            Reference::Named { name, .. } => name.clone(),
        }
    }
}

/// A borrowed view over any entity in a [`Project`].
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Source(&'a Source),
    Model(&'a Model),
    Metric {
        metric: &'a Metric,
        parent: Option<&'a Model>,
    },
    Dimension {
        dimension: &'a Dimension,
        parent: Option<&'a Model>,
    },
    Relation(&'a Relation),
    Trace(&'a Trace),
}

impl<'a> EntityRef<'a> {
    pub fn kind(&self) -> EntityKind {
        match *self {
            EntityRef::Source(_) => EntityKind::Source,
            EntityRef::Model(_) => EntityKind::Model,
            EntityRef::Metric { .. } => EntityKind::Metric,
            EntityRef::Dimension { .. } => EntityKind::Dimension,
            EntityRef::Relation(_) => EntityKind::Relation,
            EntityRef::Trace(_) => EntityKind::Trace,
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            EntityRef::Source(s) => &s.name,
            EntityRef::Model(m) => &m.name,
            EntityRef::Metric { metric, .. } => &metric.name,
            EntityRef::Dimension { dimension, .. } => &dimension.name,
            EntityRef::Relation(r) => &r.name,
            EntityRef::Trace(t) => &t.name,
        }
    }

    /// Unique identity: the name, or `model.name` for nested entities.
    pub fn id(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}.{}", parent.name, self.name()),
            None => self.name().to_string(),
        }
    }

    pub fn parent(&self) -> Option<&'a Model> {
        match *self {
            EntityRef::Metric { parent, .. } | EntityRef::Dimension { parent, .. } => parent,
            _ => None,
        }
    }

    pub fn is_nested(&self) -> bool {
        self.parent().is_some()
    }

    /// Expression of a metric or dimension.
    pub fn expression(&self) -> Option<&'a str> {
        match *self {
            EntityRef::Metric { metric, .. } => Some(&metric.expression),
            EntityRef::Dimension { dimension, .. } => Some(&dimension.expression),
            _ => None,
        }
    }

    pub fn file_path(&self) -> Option<&'a Path> {
        let path = match *self {
            EntityRef::Source(s) => &s.file_path,
            EntityRef::Model(m) => &m.file_path,
            EntityRef::Metric { metric, parent } => match &metric.file_path {
                Some(_) => &metric.file_path,
                None => return parent.and_then(|p| p.file_path.as_deref()),
            },
            EntityRef::Dimension { dimension, parent } => match &dimension.file_path {
                Some(_) => &dimension.file_path,
                None => return parent.and_then(|p| p.file_path.as_deref()),
            },
            EntityRef::Relation(r) => &r.file_path,
            EntityRef::Trace(t) => &t.file_path,
        };
        path.as_deref()
    }

    /// Everything this entity refers to, in declaration order.
    ///
    /// A model without an explicit source is tied to the project default by
    /// the graph builder, not here.
    pub fn references(&self) -> Vec<Reference> {
        match *self {
            EntityRef::Source(_) => Vec::new(),
            EntityRef::Model(model) => match &model.kind {
                ModelKind::LocalMerge { .. } => model
                    .merged_models()
                    .into_iter()
                    .map(Reference::named)
                    .collect(),
                _ => model.source_name().map(Reference::named).into_iter().collect(),
            },
            EntityRef::Metric {
                parent: Some(parent),
                ..
            }
            | EntityRef::Dimension {
                parent: Some(parent),
                ..
            } => vec![Reference::Parent(parent.name.clone())],
            EntityRef::Metric { metric, .. } => token_references(&metric.expression),
            EntityRef::Dimension { dimension, .. } => token_references(&dimension.expression),
            EntityRef::Relation(relation) => token_references(&relation.condition),
            EntityRef::Trace(trace) => {
                let mut refs = vec![Reference::named(trace.model_name())];
                for snippet in trace.sql_snippets() {
                    refs.extend(token_references(snippet));
                }
                refs
            }
        }
    }
}

fn token_references(text: &str) -> Vec<Reference> {
    extract_refs(text)
        .into_iter()
        .map(Reference::from_token)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project::new("shop")
            .with_default_source("ref(warehouse)")
            .with_source(Source::new("warehouse", SourceKind::DuckDb))
            .with_model(
                Model::sql("orders", "SELECT * FROM orders")
                    .with_metric(Metric::new("revenue", "SUM(amount)")),
            )
            .with_metric(Metric::new("aov", "${ref(orders).revenue} / COUNT(${ref(orders).id})"))
    }

    #[test]
    fn test_entities_include_nested() {
        let project = project();
        let ids: Vec<String> = project.entities().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["warehouse", "orders", "orders.revenue", "aov"]);
    }

    #[test]
    fn test_nested_reference_is_parent() {
        let project = project();
        let entities = project.entities();
        let revenue = entities.iter().find(|e| e.id() == "orders.revenue").unwrap();
        assert_eq!(
            revenue.references(),
            vec![Reference::Parent("orders".into())]
        );
    }

    #[test]
    fn test_standalone_references_from_tokens() {
        let project = project();
        let entities = project.entities();
        let aov = entities.iter().find(|e| e.id() == "aov").unwrap();
        let names: Vec<String> = aov.references().iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["orders.revenue", "orders.id"]);
    }

    #[test]
    fn test_default_source_fallback() {
        let project = project();
        let orders = project.model("orders").unwrap();
        assert_eq!(project.source_for_model(orders).unwrap().name, "warehouse");
    }

    #[test]
    fn test_nested_file_path_falls_back_to_parent() {
        let project = Project::new("p").with_model(
            Model::sql("orders", "SELECT 1")
                .with_file_path("models/orders.yml")
                .with_metric(Metric::new("n", "COUNT(*)")),
        );
        let entities = project.entities();
        let nested = entities.iter().find(|e| e.id() == "orders.n").unwrap();
        assert_eq!(nested.file_path(), Some(Path::new("models/orders.yml")));
    }
}
