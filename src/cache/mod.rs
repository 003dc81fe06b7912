//! Column schema cache.
//!
//! A separate schema-extraction job writes one JSON file per model:
//!
//! ```text
//! <output_dir>/schema/<model_name>/schema.json
//! { "<model_content_hash>": { "<column>": "<sql_type>", ... } }
//! ```
//!
//! The compiler only reads these files. Each compiler instance owns its own
//! `SchemaCache`, so loaded files are memoized per instance and never shared.

mod hash;
pub use hash::hash_str;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::model::Model;
use crate::semantic::error::{SemanticError, SemanticResult};

/// Column name to SQL type, ordered by column name.
pub type ColumnSchema = BTreeMap<String, String>;

/// Contents of one `schema.json`: content hash to columns.
pub type SchemaFile = HashMap<String, ColumnSchema>;

/// Errors that can occur while reading or writing schema files.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No entry for content hash '{0}'")]
    StaleHash(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Read-through cache over the schema directory.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    root: Option<PathBuf>,
    loaded: HashMap<String, SchemaFile>,
}

impl SchemaCache {
    /// Cache over `<output_dir>/schema`.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            root: Some(output_dir.as_ref().join("schema")),
            loaded: HashMap::new(),
        }
    }

    /// Cache with no backing directory; only inserted schemas exist.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Expected location of a model's schema file.
    pub fn schema_path(&self, model_name: &str) -> PathBuf {
        let root = self
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("<memory>"));
        root.join(model_name).join("schema.json")
    }

    /// Register a model's columns in memory.
    pub fn insert(&mut self, model: &Model, columns: ColumnSchema) {
        self.loaded
            .entry(model.name.clone())
            .or_default()
            .insert(model.content_hash(), columns);
    }

    /// Register a model's columns and write them to its schema file.
    pub fn store(&mut self, model: &Model, columns: ColumnSchema) -> CacheResult<()> {
        self.insert(model, columns);
        if self.root.is_none() {
            return Ok(());
        }
        let path = self.schema_path(&model.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.loaded[&model.name])?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Columns of `model` at its current content hash.
    ///
    /// Read failures are logged with the full path; the returned error only
    /// names the model.
    pub fn columns(&mut self, model: &Model) -> SemanticResult<&ColumnSchema> {
        let hash = model.content_hash();
        let path = self.schema_path(&model.name);

        if let Err(err) = self.ensure_loaded(&model.name, &path) {
            tracing::warn!(model = %model.name, path = %path.display(), error = %err, "schema file unreadable");
            return Err(SemanticError::SchemaMissing {
                model: model.name.clone(),
                path,
            });
        }

        match self.loaded.get(&model.name).and_then(|file| file.get(&hash)) {
            Some(columns) => Ok(columns),
            None => {
                let err = CacheError::StaleHash(hash);
                tracing::warn!(model = %model.name, path = %path.display(), error = %err, "schema file has no entry for model");
                Err(SemanticError::SchemaMissing {
                    model: model.name.clone(),
                    path,
                })
            }
        }
    }

    fn ensure_loaded(&mut self, model_name: &str, path: &Path) -> CacheResult<()> {
        if self.loaded.contains_key(model_name) || self.root.is_none() {
            return Ok(());
        }
        let text = std::fs::read_to_string(path)?;
        let file: SchemaFile = serde_json::from_str(&text)?;
        tracing::debug!(model = model_name, columns = file.len(), "loaded schema file");
        self.loaded.insert(model_name.to_string(), file);
        Ok(())
    }
}
