//! Model entity - a tabular data definition.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::dimension::Dimension;
use super::metric::Metric;
use super::reference::{extract_refs, ref_name, replace_refs};
use crate::cache::hash_str;

/// How a model produces its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    /// A query run against the model's source.
    Sql { sql: String },

    /// A command that prints CSV, loaded into a local table.
    CsvScript {
        args: Vec<String>,
        /// Table the CSV output is loaded into.
        #[serde(default = "default_csv_table")]
        table_name: String,
    },

    /// A query over other models, run by the embedded local engine.
    LocalMerge {
        sql: String,
        /// Merged models (`ref(name)` or plain names).
        models: Vec<String>,
    },
}

fn default_csv_table() -> String {
    "model".to_string()
}

/// A tabular model. Owns its nested metrics and dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(flatten)]
    pub kind: ModelKind,

    /// Source reference (`ref(name)` or plain name). Falls back to the
    /// project default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default)]
    pub metrics: Vec<Metric>,

    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

impl Model {
    fn with_kind(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            file_path: None,
            kind,
            source: None,
            metrics: Vec::new(),
            dimensions: Vec::new(),
        }
    }

    pub fn sql(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::with_kind(name, ModelKind::Sql { sql: sql.into() })
    }

    pub fn csv_script(name: impl Into<String>, args: Vec<String>) -> Self {
        Self::with_kind(
            name,
            ModelKind::CsvScript {
                args,
                table_name: default_csv_table(),
            },
        )
    }

    pub fn local_merge(name: impl Into<String>, sql: impl Into<String>, models: Vec<String>) -> Self {
        Self::with_kind(
            name,
            ModelKind::LocalMerge {
                sql: sql.into(),
                models,
            },
        )
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
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

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn is_local_merge(&self) -> bool {
        matches!(self.kind, ModelKind::LocalMerge { .. })
    }

    /// Explicit source name, with `ref()` wrapping removed.
    pub fn source_name(&self) -> Option<String> {
        self.source.as_deref().map(ref_name)
    }

    /// Models a merge model reads from, in declaration order, deduplicated.
    pub fn merged_models(&self) -> Vec<String> {
        let ModelKind::LocalMerge { sql, models } = &self.kind else {
            return Vec::new();
        };
        let mut names: Vec<String> = Vec::new();
        let declared = models.iter().map(|m| ref_name(m));
        let in_sql = extract_refs(sql).into_iter().map(|t| t.name);
        for name in declared.chain(in_sql) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// SQL used as the body of this model's CTE.
    pub fn base_sql(&self) -> String {
        match &self.kind {
            ModelKind::Sql { sql } => sql.trim().trim_end_matches(';').trim_end().to_string(),
            ModelKind::CsvScript { table_name, .. } => {
                format!("SELECT * FROM \"{}\"", table_name.replace('"', "\"\""))
            }
            ModelKind::LocalMerge { sql, .. } => {
                let merged: Result<String, std::convert::Infallible> = replace_refs(sql, |t| {
                    Ok(Some(format!("\"{}\"", t.name.replace('"', "\"\""))))
                });
                let merged = merged.unwrap_or_else(|never| match never {});
                merged.trim().trim_end_matches(';').trim_end().to_string()
            }
        }
    }

    /// Stable identity of this model's definition.
    ///
    /// Used as the schema-cache key and as the table qualifier for its
    /// columns. Starts with a letter so it is a valid identifier.
    pub fn content_hash(&self) -> String {
        let source = self.source_name().unwrap_or_default();
        let digest = hash_str(&format!("{}\0{}\0{}", self.name, self.base_sql(), source));
        format!("m{}", &digest[..16])
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }
}
