//! Shared helper functions for SQL dialect implementations.
//!
//! Reusable building blocks that dialects compose to implement the
//! `SqlDialect` trait with minimal duplication.

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, Snowflake, Redshift, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL, BigQuery, Databricks
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL (SQL Server, Azure Synapse)
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_double() {
        assert_eq!(quote_double("users"), "\"users\"");
        assert_eq!(quote_double("my\"table"), "\"my\"\"table\"");
    }

    #[test]
    fn test_quote_backtick() {
        assert_eq!(quote_backtick("users"), "`users`");
        assert_eq!(quote_backtick("my`table"), "`my``table`");
    }

    #[test]
    fn test_quote_bracket() {
        assert_eq!(quote_bracket("users"), "[users]");
        assert_eq!(quote_bracket("my]table"), "[my]]table]");
    }
}
