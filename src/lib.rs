//! # Trellis
//!
//! A semantic layer that compiles charts over metrics, dimensions and
//! relations into SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Project (model::Project)                 │
//! │  (sources, models, metrics, dimensions, relations,       │
//! │   traces)                                                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [semantic::graph + validate]
//! ┌─────────────────────────────────────────────────────────┐
//! │          DependencyGraph (validated, acyclic)            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [resolver + field_resolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Ref-free SQL fragments qualified by model hash       │
//! │     (schema columns from cache::SchemaCache)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [tokenizer + relation_graph + query_builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Per-trace SQL (compile::Compiler)           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod compile;
pub mod config;
pub mod model;
pub mod semantic;
pub mod sql;

pub use sql::dialect;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{CompileOptions, CompiledTrace, Compiler};
    pub use crate::dialect::{Dialect, SqlDialect};
    pub use crate::model::{
        Dimension, EntityKind, JoinType, Metric, Model, Project, Relation, Source, SourceKind,
        Trace,
    };
    pub use crate::semantic::{ErrorReport, SemanticError, SemanticResult};
}

// Also export at crate root for convenience
pub use compile::{CompileOptions, CompiledTrace, Compiler};
pub use dialect::Dialect;
pub use model::Project;
pub use semantic::{ErrorReport, SemanticError};
