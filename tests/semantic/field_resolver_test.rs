//! Integration tests for field resolution against on-disk schema files.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use trellis::cache::SchemaCache;
use trellis::model::{Dimension, Metric, Model, Project};
use trellis::semantic::{FieldResolver, SemanticError};
use trellis::sql::Dialect;

struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "trellis-field-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        TempDir(path)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn project() -> Project {
    Project::new("shop")
        .with_model(
            Model::sql("orders", "SELECT * FROM raw.orders")
                .with_metric(Metric::new("revenue", "SUM(amount)"))
                .with_dimension(Dimension::new("status_label", "UPPER(status)")),
        )
        .with_model(Model::sql("users", "SELECT * FROM raw.users"))
        .with_metric(Metric::new("avg_amount", "AVG(amount)"))
        .with_metric(Metric::new("doubled", "${ref(avg_amount)} * 2"))
}

fn schema(columns: &[(&str, &str)]) -> BTreeMap<String, String> {
    columns
        .iter()
        .map(|(c, t)| (c.to_string(), t.to_string()))
        .collect()
}

fn write_schemas(dir: &TempDir, project: &Project) {
    let mut cache = SchemaCache::new(&dir.0);
    cache
        .store(
            project.model("orders").unwrap(),
            schema(&[("id", "INTEGER"), ("amount", "DECIMAL"), ("status", "VARCHAR")]),
        )
        .unwrap();
    cache
        .store(
            project.model("users").unwrap(),
            schema(&[("id", "INTEGER"), ("email", "VARCHAR")]),
        )
        .unwrap();
}

fn quoted(a: &str, b: &str) -> String {
    format!("\"{}\".\"{}\"", a, b)
}

#[test]
fn test_column_qualified_with_content_hash() {
    let dir = TempDir::new("column");
    let project = project();
    write_schemas(&dir, &project);
    let mut fields = FieldResolver::new(&project, SchemaCache::new(&dir.0));

    let field = fields
        .resolve("chart", "${ref(orders).amount}", "orders", Dialect::DuckDb)
        .unwrap();

    let hash = project.model("orders").unwrap().content_hash();
    assert_eq!(field.sql, quoted(&hash, "amount"));
    assert_eq!(field.alias, "amount");
}

#[test]
fn test_unknown_column_lists_names_not_types() {
    let dir = TempDir::new("unknown");
    let project = project();
    write_schemas(&dir, &project);
    let mut fields = FieldResolver::new(&project, SchemaCache::new(&dir.0));

    let err = fields
        .resolve("chart", "${ref(orders).price}", "orders", Dialect::DuckDb)
        .unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, SemanticError::UnknownColumn { .. }));
    assert!(message.contains("id"));
    assert!(message.contains("amount"));
    assert!(!message.contains("INTEGER"));
    assert!(!message.contains("DECIMAL"));
}

#[test]
fn test_global_metric_chain_uses_calling_model() {
    let dir = TempDir::new("global");
    let project = project();
    write_schemas(&dir, &project);
    let mut fields = FieldResolver::new(&project, SchemaCache::new(&dir.0));

    let field = fields
        .resolve("chart", "${ref(doubled)}", "orders", Dialect::DuckDb)
        .unwrap();

    let hash = project.model("orders").unwrap().content_hash();
    assert_eq!(field.sql, format!("((AVG({})) * 2)", quoted(&hash, "amount")));
    assert_eq!(field.alias, "doubled");
}

#[test]
fn test_model_scoped_dimension() {
    let dir = TempDir::new("scoped");
    let project = project();
    write_schemas(&dir, &project);
    let mut fields = FieldResolver::new(&project, SchemaCache::new(&dir.0));

    let field = fields
        .resolve("chart", "${ref(orders).status_label}", "users", Dialect::Postgres)
        .unwrap();

    let hash = project.model("orders").unwrap().content_hash();
    assert_eq!(field.sql, format!("(UPPER({}))", quoted(&hash, "status")));
}

#[test]
fn test_string_literals_untouched() {
    let dir = TempDir::new("literal");
    let project = project().with_metric(Metric::new("named", "COUNT(CASE WHEN status = 'amount' THEN 1 END)"));
    write_schemas(&dir, &project);
    let mut fields = FieldResolver::new(&project, SchemaCache::new(&dir.0));

    let field = fields
        .resolve("chart", "${ref(named)}", "orders", Dialect::DuckDb)
        .unwrap();

    let hash = project.model("orders").unwrap().content_hash();
    assert!(field.sql.contains(&quoted(&hash, "status")));
    assert!(field.sql.contains("'amount'"));
    assert!(!field.sql.contains(&quoted(&hash, "amount")));
}

#[test]
fn test_missing_schema_file() {
    let dir = TempDir::new("missing");
    let project = project();
    let mut fields = FieldResolver::new(&project, SchemaCache::new(&dir.0));

    let err = fields
        .resolve("chart", "${ref(users).email}", "users", Dialect::DuckDb)
        .unwrap_err();

    match &err {
        SemanticError::SchemaMissing { model, path } => {
            assert_eq!(model, "users");
            assert_eq!(path, &dir.0.join("schema").join("users").join("schema.json"));
        }
        other => panic!("expected SchemaMissing, got {other:?}"),
    }
    assert!(!err.to_string().contains("schema.json"));
}

#[test]
fn test_corrupt_schema_file() {
    let dir = TempDir::new("corrupt");
    let project = project();
    let path = dir.0.join("schema").join("users");
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("schema.json"), "{ not json").unwrap();
    let mut fields = FieldResolver::new(&project, SchemaCache::new(&dir.0));

    let err = fields
        .resolve("chart", "${ref(users).email}", "users", Dialect::DuckDb)
        .unwrap_err();
    assert_eq!(err.kind(), "schema_missing");
}

#[test]
fn test_stale_schema_entry() {
    let dir = TempDir::new("stale");
    let old = project();
    write_schemas(&dir, &old);

    // Same model name, different SQL: the stored hash no longer matches.
    let changed = Project::new("shop").with_model(Model::sql("users", "SELECT id FROM raw.users"));
    let mut fields = FieldResolver::new(&changed, SchemaCache::new(&dir.0));

    let err = fields
        .resolve("chart", "${ref(users).email}", "users", Dialect::DuckDb)
        .unwrap_err();
    assert_eq!(err.kind(), "schema_missing");
}
