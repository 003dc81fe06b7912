//! Semantic layer: dependency analysis, reference resolution and query
//! assembly.
//!
//! Compilation runs in phases, each a module here:
//!
//! 1. **Graph** - entity dependency graph built from `${ref(...)}` tokens
//! 2. **Validate** - reference kinds, cycles, single base model and source
//! 3. **Resolve** - metric and dimension expressions to ref-free SQL
//! 4. **Plan joins** - relation graph over models
//! 5. **Tokenize** - trace snippets to qualified, classified fragments
//! 6. **Build** - CTEs, joins and clauses

pub mod error;
pub mod field_resolver;
pub mod graph;
pub mod query_builder;
pub mod relation_graph;
pub mod resolver;
pub mod tokenizer;
pub mod validate;

pub use error::{ErrorEntry, ErrorReport, SemanticError, SemanticResult};
pub use field_resolver::{FieldResolver, ResolvedField};
pub use graph::{DependencyGraph, GraphNode};
pub use query_builder::QueryBuilder;
pub use relation_graph::{JoinStep, RelationGraph, RelationWarning};
pub use resolver::MetricResolver;
pub use tokenizer::{
    FilterBuckets, Fragment, OrderItem, SortDirection, TokenizedTrace, TraceTokenizer,
    WindowFilters,
};
pub use validate::{validate_nested_syntax, validate_project, Validator};
