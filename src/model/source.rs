//! Source entity definitions - connections to the databases models read from.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sql::dialect::Dialect;

/// Database engine behind a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    DuckDb,
    PostgreSql,
    MySql,
    Sqlite,
    Snowflake,
    BigQuery,
    Redshift,
    Databricks,
    SqlServer,
}

impl SourceKind {
    /// SQL dialect spoken by this engine.
    pub fn dialect(self) -> Dialect {
        match self {
            SourceKind::DuckDb => Dialect::DuckDb,
            SourceKind::PostgreSql => Dialect::Postgres,
            SourceKind::MySql => Dialect::MySql,
            SourceKind::Sqlite => Dialect::Sqlite,
            SourceKind::Snowflake => Dialect::Snowflake,
            SourceKind::BigQuery => Dialect::BigQuery,
            SourceKind::Redshift => Dialect::Redshift,
            SourceKind::Databricks => Dialect::Databricks,
            SourceKind::SqlServer => Dialect::TSql,
        }
    }
}

/// A connection descriptor. Sources never depend on anything in the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,

    /// File the source was declared in, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(rename = "type")]
    pub kind: SourceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name, or file path for embedded engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password, usually an `${ENV_VAR}` placeholder expanded by the caller.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl Source {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            file_path: None,
            kind,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.kind.dialect()
    }
}
