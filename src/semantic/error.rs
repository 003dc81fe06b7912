//! Error types for the semantic layer.
//!
//! One enum covers every failure the compiler can report: reference and
//! ownership violations found by the validator, cycles found by either the
//! validator or the resolver, field resolution failures, and join planning
//! failures. All of them are fatal to the compile attempt that raised them.

use serde::Serialize;
use std::path::PathBuf;

use crate::model::EntityKind;

/// Result type for semantic operations.
pub type SemanticResult<T> = Result<T, SemanticError>;

/// Error type for the semantic layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SemanticError {
    /// A name that does not exist anywhere in the project.
    #[error("'{entity}' references '{reference}', which does not exist in the project")]
    UnresolvedReference { entity: String, reference: String },

    /// A metric, dimension or relation pointing at a disallowed entity kind.
    #[error("{entity_kind} '{entity}' cannot reference {target_kind} '{target}'")]
    InvalidReferenceKind {
        entity: String,
        entity_kind: EntityKind,
        target: String,
        target_kind: EntityKind,
    },

    #[error("'{entity}' does not tie back to any base model")]
    NoBaseModel { entity: String },

    #[error("'{entity}' ties back to multiple base models: [{}]", .models.join(", "))]
    MultipleBaseModels { entity: String, models: Vec<String> },

    #[error("'{entity}' does not tie back to any source")]
    NoSource { entity: String },

    #[error("'{entity}' ties back to multiple sources: [{}]", .sources.join(", "))]
    MultipleSources { entity: String, sources: Vec<String> },

    /// A reference cycle. The path starts and ends with the same name.
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// An unqualified name matching nested entities in several models.
    #[error(
        "'{reference}' in '{entity}' is ambiguous, it matches: {}. Qualify it as ${{ref(model).{reference}}}",
        .candidates.join(", ")
    )]
    AmbiguousReference {
        entity: String,
        reference: String,
        candidates: Vec<String>,
    },

    /// The model's schema file is missing, unreadable, or has no entry for
    /// the model's current definition.
    #[error("Schema for model '{model}' is not available; run schema extraction first")]
    SchemaMissing { model: String, path: PathBuf },

    #[error(
        "Column '{column}' not found in model '{model}'. Available columns: {}{}",
        .available.join(", "),
        suggestion_suffix(.suggestion)
    )]
    UnknownColumn {
        model: String,
        column: String,
        available: Vec<String>,
        suggestion: Option<String>,
    },

    #[error(
        "No join path connects models [{}]; unreachable: [{}]",
        .models.join(", "),
        .unreachable.join(", ")
    )]
    NoJoinPath {
        models: Vec<String>,
        unreachable: Vec<String>,
    },

    /// A metric or dimension declared inside a model using `ref()` syntax.
    #[error("'{entity}' is defined inside a model and cannot use ref() syntax: {expression}")]
    NestedReference { entity: String, expression: String },

    #[error("Relation '{relation}' must join exactly two models, found [{}]", .models.join(", "))]
    InvalidRelation { relation: String, models: Vec<String> },

    #[error("Name '{name}' is declared more than once ({})", join_kinds(.kinds))]
    DuplicateName { name: String, kinds: Vec<EntityKind> },

    /// A bare `${ref(model)}` where a column or metric is required.
    #[error("'${{ref({reference})}}' in '{entity}' names a model; reference a column as ${{ref({reference}).column}}")]
    InvalidFieldReference { entity: String, reference: String },

    #[error("Unknown trace: '{name}'")]
    UnknownTrace { name: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(". Did you mean '{}'?", s),
        None => String::new(),
    }
}

fn join_kinds(kinds: &[EntityKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl SemanticError {
    /// Stable snake_case identifier of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SemanticError::UnresolvedReference { .. } => "unresolved_reference",
            SemanticError::InvalidReferenceKind { .. } => "invalid_reference_kind",
            SemanticError::NoBaseModel { .. } => "no_base_model",
            SemanticError::MultipleBaseModels { .. } => "multiple_base_models",
            SemanticError::NoSource { .. } => "no_source",
            SemanticError::MultipleSources { .. } => "multiple_sources",
            SemanticError::CircularDependency { .. } => "circular_dependency",
            SemanticError::AmbiguousReference { .. } => "ambiguous_reference",
            SemanticError::SchemaMissing { .. } => "schema_missing",
            SemanticError::UnknownColumn { .. } => "unknown_column",
            SemanticError::NoJoinPath { .. } => "no_join_path",
            SemanticError::NestedReference { .. } => "nested_reference",
            SemanticError::InvalidRelation { .. } => "invalid_relation",
            SemanticError::DuplicateName { .. } => "duplicate_name",
            SemanticError::InvalidFieldReference { .. } => "invalid_field_reference",
            SemanticError::UnknownTrace { .. } => "unknown_trace",
        }
    }

    /// The entity the error is about, when there is one.
    pub fn entity(&self) -> Option<&str> {
        match self {
            SemanticError::UnresolvedReference { entity, .. }
            | SemanticError::InvalidReferenceKind { entity, .. }
            | SemanticError::NoBaseModel { entity }
            | SemanticError::MultipleBaseModels { entity, .. }
            | SemanticError::NoSource { entity }
            | SemanticError::MultipleSources { entity, .. }
            | SemanticError::AmbiguousReference { entity, .. }
            | SemanticError::NestedReference { entity, .. }
            | SemanticError::InvalidFieldReference { entity, .. } => Some(entity),
            SemanticError::SchemaMissing { model, .. } | SemanticError::UnknownColumn { model, .. } => {
                Some(model)
            }
            SemanticError::InvalidRelation { relation, .. } => Some(relation),
            SemanticError::DuplicateName { name, .. } | SemanticError::UnknownTrace { name } => {
                Some(name)
            }
            SemanticError::CircularDependency { cycle } => cycle.first().map(String::as_str),
            SemanticError::NoJoinPath { .. } => None,
        }
    }

    /// Cycle path, for circular dependency errors.
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            SemanticError::CircularDependency { cycle } => Some(cycle),
            _ => None,
        }
    }
}

/// Closest candidate within edit distance 3, for "did you mean" hints.
pub fn suggest_closest(name: &str, candidates: &[String]) -> Option<String> {
    let query = name.to_ascii_lowercase();
    candidates
        .iter()
        .map(|c| (c, strsim::levenshtein(&query, &c.to_ascii_lowercase())))
        .filter(|(_, distance)| *distance <= 3)
        .min_by_key(|(_, distance)| *distance)
        .map(|(c, _)| c.clone())
}

/// One entry of an [`ErrorReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<String>>,
}

impl From<&SemanticError> for ErrorEntry {
    fn from(err: &SemanticError) -> Self {
        Self {
            kind: err.kind(),
            entity: err.entity().map(str::to_string),
            message: err.to_string(),
            cycle: err.cycle().map(<[String]>::to_vec),
        }
    }
}

/// Every error found in one compile of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorReport {
    pub errors: Vec<ErrorEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ErrorReport {
    pub fn from_errors<'a>(errors: impl IntoIterator<Item = &'a SemanticError>) -> Self {
        Self {
            errors: errors.into_iter().map(ErrorEntry::from).collect(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} error(s):", self.errors.len())?;
        for entry in &self.errors {
            writeln!(f, "  [{}] {}", entry.kind, entry.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorReport {}
