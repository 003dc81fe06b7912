//! SQL dialect definitions.
//!
//! This module provides a trait-based abstraction for the dialect differences
//! the compiler has to care about when it emits trace queries:
//!
//! - Identifier quoting: `"` (ANSI/PG/DuckDB), `` ` `` (MySQL), `[]` (T-SQL)
//! - Window-function filtering: native QUALIFY or not
//! - FULL OUTER JOIN availability
//! - Which `sqlparser` dialect understands the source's expressions
//!
//! # Usage
//!
//! ```
//! use trellis::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! assert_eq!(dialect.quote_identifier("user"), "\"user\"");
//! assert!(!dialect.supports_qualify());
//! ```
//!
//! | Feature | PostgreSQL | SQL Server | MySQL | SQLite | DuckDB | Snowflake | BigQuery | Databricks |
//! |---------|-----------|------------|-------|--------|--------|-----------|----------|------------|
//! | QUALIFY | ❌ | ❌ | ❌ | ❌ | ✓ | ✓ | ✓ | ✓ |
//! | FULL OUTER JOIN | ✓ | ✓ | ❌ | ❌ | ✓ | ✓ | ✓ | ✓ |

mod bigquery;
mod databricks;
mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod redshift;
mod snowflake;
mod sqlite;
mod tsql;

pub use bigquery::BigQuery;
pub use databricks::Databricks;
pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use redshift::Redshift;
pub use snowflake::Snowflake;
pub use sqlite::Sqlite;
pub use tsql::TSql;

use serde::{Deserialize, Serialize};

/// SQL dialect trait - defines how dialect-specific constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column, alias).
    ///
    /// - ANSI/PostgreSQL/DuckDB: `"identifier"`
    /// - MySQL: `` `identifier` ``
    /// - T-SQL: `[identifier]`
    fn quote_identifier(&self, ident: &str) -> String;

    /// Opening quote character, in the form `sqlparser::ast::Ident` expects.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Whether window-function results can be filtered with QUALIFY.
    fn supports_qualify(&self) -> bool {
        false
    }

    /// Whether this dialect supports FULL OUTER JOIN.
    fn supports_full_outer_join(&self) -> bool {
        true
    }

    /// The `sqlparser` dialect used to parse expressions written for this engine.
    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect>;
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    TSql,
    MySql,
    Postgres,
    Sqlite,
    Snowflake,
    BigQuery,
    Redshift,
    Databricks,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::TSql => &TSql,
            Dialect::MySql => &MySql,
            Dialect::Sqlite => &Sqlite,
            Dialect::Snowflake => &Snowflake,
            Dialect::BigQuery => &BigQuery,
            Dialect::Redshift => &Redshift,
            Dialect::Databricks => &Databricks,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn identifier_quote(&self) -> char {
        self.dialect().identifier_quote()
    }

    fn supports_qualify(&self) -> bool {
        self.dialect().supports_qualify()
    }

    fn supports_full_outer_join(&self) -> bool {
        self.dialect().supports_full_outer_join()
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        self.dialect().parser_dialect()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "tsql" | "mssql" | "sqlserver" => Ok(Dialect::TSql),
            "mysql" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "snowflake" => Ok(Dialect::Snowflake),
            "bigquery" => Ok(Dialect::BigQuery),
            "redshift" => Ok(Dialect::Redshift),
            "databricks" => Ok(Dialect::Databricks),
            other => Err(format!("unknown SQL dialect '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::DuckDb.to_string(), "duckdb");
        assert_eq!(Dialect::Postgres.to_string(), "postgres");
        assert_eq!(Dialect::TSql.to_string(), "tsql");
        assert_eq!(Dialect::MySql.to_string(), "mysql");
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::DuckDb.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::TSql.quote_identifier("users"), "[users]");
        assert_eq!(Dialect::MySql.quote_identifier("users"), "`users`");
        assert_eq!(Dialect::BigQuery.quote_identifier("users"), "`users`");
    }

    #[test]
    fn test_quote_identifier_escaping() {
        assert_eq!(
            Dialect::DuckDb.quote_identifier("weird\"name"),
            "\"weird\"\"name\""
        );
        assert_eq!(
            Dialect::TSql.quote_identifier("weird]name"),
            "[weird]]name]"
        );
        assert_eq!(
            Dialect::MySql.quote_identifier("weird`name"),
            "`weird``name`"
        );
    }

    #[test]
    fn test_supports_qualify() {
        assert!(Dialect::DuckDb.supports_qualify());
        assert!(Dialect::Snowflake.supports_qualify());
        assert!(Dialect::BigQuery.supports_qualify());
        assert!(Dialect::Databricks.supports_qualify());
        assert!(!Dialect::Postgres.supports_qualify());
        assert!(!Dialect::TSql.supports_qualify());
        assert!(!Dialect::MySql.supports_qualify());
        assert!(!Dialect::Sqlite.supports_qualify());
        assert!(!Dialect::Redshift.supports_qualify());
    }

    #[test]
    fn test_supports_full_outer_join() {
        assert!(Dialect::DuckDb.supports_full_outer_join());
        assert!(Dialect::Postgres.supports_full_outer_join());
        assert!(!Dialect::MySql.supports_full_outer_join());
        assert!(!Dialect::Sqlite.supports_full_outer_join());
    }

    #[test]
    fn test_identifier_quote_matches_quoting() {
        for dialect in [
            Dialect::DuckDb,
            Dialect::TSql,
            Dialect::MySql,
            Dialect::Postgres,
            Dialect::Sqlite,
            Dialect::Snowflake,
            Dialect::BigQuery,
            Dialect::Redshift,
            Dialect::Databricks,
        ] {
            let quoted = dialect.quote_identifier("x");
            assert!(quoted.starts_with(dialect.identifier_quote()), "{dialect}");
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("duckdb".parse::<Dialect>().unwrap(), Dialect::DuckDb);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlserver".parse::<Dialect>().unwrap(), Dialect::TSql);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Dialect::BigQuery).unwrap();
        assert_eq!(json, "\"bigquery\"");
        let parsed: Dialect = serde_json::from_str("\"tsql\"").unwrap();
        assert_eq!(parsed, Dialect::TSql);
    }
}
