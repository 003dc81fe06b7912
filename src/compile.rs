//! End-to-end compilation from a project to per-trace SQL.
//!
//! ```text
//! Project → Graph → Validate → Resolve → Relations → Tokenize → SQL
//! ```
//!
//! # Example
//!
//! ```ignore
//! use trellis::compile::{CompileOptions, Compiler};
//! use trellis::sql::Dialect;
//!
//! let options = CompileOptions::default()
//!     .with_dialect(Dialect::Postgres)
//!     .with_output_dir("target");
//! let mut compiler = Compiler::new(&project, options)?;
//! let compiled = compiler.compile_trace("revenue_by_region")?;
//! println!("{}", compiled.sql);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::SchemaCache;
use crate::config::{Settings, SettingsError};
use crate::model::{Model, Project, Source};
use crate::semantic::{
    validate_project, DependencyGraph, ErrorReport, FieldResolver, FilterBuckets, QueryBuilder,
    RelationGraph, SemanticError, SemanticResult, TraceTokenizer, WindowFilters,
};
use crate::sql::Dialect;

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Dialect for models whose source does not determine one.
    pub dialect: Dialect,

    /// Directory holding `schema/<model>/schema.json`.
    pub output_dir: PathBuf,

    pub window_filters: WindowFilters,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            output_dir: PathBuf::from("target"),
            window_filters: WindowFilters::default(),
        }
    }
}

impl CompileOptions {
    /// Options from loaded settings, with `${ENV}` expanded in paths.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self {
            dialect: settings.compile.dialect,
            output_dir: settings.schema.resolved_output_dir()?,
            window_filters: settings.compile.window_filters,
        })
    }

    /// Set the fallback SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the schema cache root.
    pub fn with_output_dir(mut self, output_dir: impl AsRef<Path>) -> Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_window_filters(mut self, window_filters: WindowFilters) -> Self {
        self.window_filters = window_filters;
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// A compiled trace, ready for the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledTrace {
    pub trace: String,

    /// The generated SQL string.
    pub sql: String,

    /// Prop path to resolved SQL.
    pub select_items: BTreeMap<String, String>,

    pub filters: FilterBuckets,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,

    /// Models joined in besides the trace's own.
    pub referenced_models: Vec<String>,

    /// The dialect used for generation.
    pub dialect: Dialect,

    pub warnings: Vec<String>,
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles the traces of one validated project.
///
/// Holds every per-compile cache (resolved expressions, loaded schemas,
/// sanitized aliases). Build a new one after the project changes.
#[derive(Debug)]
pub struct Compiler<'p> {
    project: &'p Project,
    options: CompileOptions,
    graph: DependencyGraph,
    relations: RelationGraph,
    fields: FieldResolver<'p>,
    builder: QueryBuilder<'p>,
    warnings: Vec<String>,
}

impl<'p> Compiler<'p> {
    /// Validate `project` and prepare it for compilation.
    ///
    /// Every validation error is collected into the report.
    pub fn new(project: &'p Project, options: CompileOptions) -> Result<Self, ErrorReport> {
        let graph = validate_project(project).map_err(|errors| ErrorReport::from_errors(&errors))?;
        let relations = RelationGraph::new(project).map_err(|e| ErrorReport::from_errors([&e]))?;
        let warnings: Vec<String> = relations.validate().iter().map(|w| w.to_string()).collect();

        let mut fields = FieldResolver::new(project, SchemaCache::new(&options.output_dir));
        fields
            .metrics_mut()
            .resolve_all()
            .map_err(|e| ErrorReport::from_errors([&e]).with_warnings(warnings.clone()))?;

        tracing::debug!(
            project = %project.name,
            entities = graph.node_count(),
            dependencies = graph.edge_count(),
            traces = project.traces.len(),
            "project ready to compile"
        );

        Ok(Self {
            project,
            options,
            graph,
            relations,
            fields,
            builder: QueryBuilder::new(project),
            warnings,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn relations(&self) -> &RelationGraph {
        &self.relations
    }

    /// Project-level warnings (relation graph checks).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Dialect a model's SQL is written in.
    ///
    /// Local merge models run on the embedded engine.
    pub fn dialect_for(&self, model: &Model) -> Dialect {
        if model.is_local_merge() {
            return Dialect::DuckDb;
        }
        self.project
            .source_for_model(model)
            .map(Source::dialect)
            .unwrap_or(self.options.dialect)
    }

    pub fn compile_trace(&mut self, name: &str) -> SemanticResult<CompiledTrace> {
        let project = self.project;
        let trace = project
            .trace(name)
            .ok_or_else(|| SemanticError::UnknownTrace {
                name: name.to_string(),
            })?;
        let model = project
            .model(&trace.model_name())
            .ok_or_else(|| SemanticError::UnresolvedReference {
                entity: trace.name.clone(),
                reference: trace.model_name(),
            })?;
        let dialect = self.dialect_for(model);

        let tokenized = TraceTokenizer::new(&mut self.fields)
            .with_window_filters(self.options.window_filters)
            .tokenize(trace, dialect)?;
        let sql = self.builder.build(&tokenized, &self.relations)?;

        let mut warnings = tokenized.warnings.clone();
        warnings.extend(self.builder.take_warnings());

        tracing::debug!(trace = name, dialect = %dialect, "compiled trace");
        Ok(CompiledTrace {
            trace: tokenized.trace.clone(),
            sql,
            select_items: tokenized
                .select_items
                .iter()
                .map(|(name, f)| (name.clone(), f.sql.clone()))
                .collect(),
            group_by: tokenized.group_by.clone(),
            order_by: tokenized.order_by.iter().map(|o| o.to_sql()).collect(),
            referenced_models: tokenized.referenced_models.iter().cloned().collect(),
            filters: tokenized.filters,
            dialect,
            warnings,
        })
    }

    /// Compile every trace, collecting all failures.
    pub fn compile_all(&mut self) -> Result<BTreeMap<String, CompiledTrace>, ErrorReport> {
        let project = self.project;
        let mut compiled = BTreeMap::new();
        let mut errors = Vec::new();

        for trace in &project.traces {
            match self.compile_trace(&trace.name) {
                Ok(output) => {
                    compiled.insert(trace.name.clone(), output);
                }
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() {
            Ok(compiled)
        } else {
            Err(ErrorReport::from_errors(&errors).with_warnings(self.warnings.clone()))
        }
    }
}
