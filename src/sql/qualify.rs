//! Expression-level SQL analysis on top of `sqlparser`.
//!
//! Field resolution needs to rewrite bare column names into
//! `"<qualifier>"."column"` without touching string literals or function
//! names, and the tokenizer needs to know whether a fragment aggregates or
//! windows. Both are done on the parsed AST, never by string matching,
//! except for the classification fallback when a fragment does not parse.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{visit_expressions, visit_expressions_mut, Expr, Ident};
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;

use super::dialect::{Dialect, SqlDialect};

/// Aggregate function names recognised across the supported engines.
const AGGREGATE_FUNCTIONS: &[&str] = &[
    "any_value",
    "approx_count_distinct",
    "approx_quantile",
    "arbitrary",
    "array_agg",
    "avg",
    "bit_and",
    "bit_or",
    "bool_and",
    "bool_or",
    "corr",
    "count",
    "count_if",
    "countif",
    "covar_pop",
    "covar_samp",
    "every",
    "first",
    "group_concat",
    "last",
    "listagg",
    "max",
    "median",
    "min",
    "mode",
    "percentile_cont",
    "percentile_disc",
    "product",
    "quantile",
    "quantile_cont",
    "quantile_disc",
    "stddev",
    "stddev_pop",
    "stddev_samp",
    "string_agg",
    "sum",
    "var_pop",
    "var_samp",
    "variance",
];

static WINDOW_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bover\s*\(").unwrap());

static AGGREGATE_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    let names = AGGREGATE_FUNCTIONS.join("|");
    Regex::new(&format!(r"(?i)\b({})\s*\(", names)).unwrap()
});

/// How a SQL fragment behaves with respect to grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// Row-level: no aggregate and no window call.
    Vanilla,
    /// Contains an aggregate function call.
    Aggregate,
    /// Contains an `OVER (...)` window call.
    Window,
}

impl FragmentKind {
    pub fn is_aggregate(self) -> bool {
        self == FragmentKind::Aggregate
    }

    /// Vanilla and window fragments both have to appear in GROUP BY.
    pub fn is_groupable(self) -> bool {
        self != FragmentKind::Aggregate
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FragmentKind::Vanilla => write!(f, "vanilla"),
            FragmentKind::Aggregate => write!(f, "aggregate"),
            FragmentKind::Window => write!(f, "window"),
        }
    }
}

/// Parse a single SQL expression, rejecting trailing input.
pub fn parse_expression(sql: &str, dialect: Dialect) -> Result<Expr, ParserError> {
    let parser_dialect = dialect.parser_dialect();
    let mut parser = Parser::new(&*parser_dialect).try_with_sql(sql)?;
    let expr = parser.parse_expr()?;

    let next = parser.peek_token();
    if next.token != Token::EOF {
        return Err(ParserError::ParserError(format!(
            "unexpected '{}' after expression",
            next.token
        )));
    }
    Ok(expr)
}

/// Validates that a SQL string is syntactically valid for the given dialect.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let parser_dialect = dialect.parser_dialect();
    Parser::parse_sql(&*parser_dialect, sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {}: {}", dialect, e))
}

/// Rewrite every bare identifier naming a column in `columns` into
/// `<qualifier>.<column>`, quoted for `dialect`.
///
/// Matching is exact first, then case-insensitive. Identifiers that are not
/// columns, string literals and function names are left alone. An expression
/// that does not parse is returned unchanged.
pub fn qualify_columns(
    expression: &str,
    qualifier: &str,
    columns: &BTreeMap<String, String>,
    dialect: Dialect,
) -> String {
    let mut expr = match parse_expression(expression, dialect) {
        Ok(expr) => expr,
        Err(err) => {
            tracing::debug!(expression, error = %err, "expression not parsed, left unqualified");
            return expression.to_string();
        }
    };

    let quote = dialect.identifier_quote();
    let _ = visit_expressions_mut(&mut expr, |e| {
        if let Expr::Identifier(ident) = e {
            if let Some(column) = match_column(&ident.value, columns) {
                *e = Expr::CompoundIdentifier(vec![
                    Ident::with_quote(quote, qualifier),
                    Ident::with_quote(quote, column),
                ]);
            }
        }
        ControlFlow::<()>::Continue(())
    });

    expr.to_string()
}

/// Swap the leading qualifier of compound identifiers: each `(from, to)`
/// pair turns `"<from>".col` into `"<to>".col`, quoted for `dialect`.
///
/// String literals keep their text. An expression that does not parse has
/// its quoted qualifiers replaced textually instead.
pub fn rename_qualifiers(
    expression: &str,
    renames: &[(String, String)],
    dialect: Dialect,
) -> String {
    if !renames.iter().any(|(from, _)| expression.contains(from.as_str())) {
        return expression.to_string();
    }

    let mut expr = match parse_expression(expression, dialect) {
        Ok(expr) => expr,
        Err(err) => {
            tracing::debug!(expression, error = %err, "expression not parsed, qualifiers renamed as text");
            return renames.iter().fold(expression.to_string(), |acc, (from, to)| {
                acc.replace(&dialect.quote_identifier(from), &dialect.quote_identifier(to))
            });
        }
    };

    let quote = dialect.identifier_quote();
    let _ = visit_expressions_mut(&mut expr, |e| {
        if let Expr::CompoundIdentifier(parts) = e {
            if let Some(first) = parts.first_mut() {
                if let Some((_, to)) = renames.iter().find(|(from, _)| *from == first.value) {
                    *first = Ident::with_quote(quote, to.as_str());
                }
            }
        }
        ControlFlow::<()>::Continue(())
    });

    expr.to_string()
}

/// The column `name` refers to: an exact match, else the only
/// case-insensitive one.
pub fn match_column<'a>(name: &str, columns: &'a BTreeMap<String, String>) -> Option<&'a str> {
    if let Some((column, _)) = columns.get_key_value(name) {
        return Some(column.as_str());
    }
    let mut matches = columns
        .keys()
        .filter(|column| column.eq_ignore_ascii_case(name));
    match (matches.next(), matches.next()) {
        (Some(column), None) => Some(column.as_str()),
        _ => None,
    }
}

/// Classify a fragment as vanilla, aggregate or window.
///
/// A window call wins over an aggregate (`SUM(x) OVER (...)` is a window
/// fragment). Unparsable fragments are classified by a keyword scan.
pub fn classify(expression: &str, dialect: Dialect) -> FragmentKind {
    let expr = match parse_expression(expression, dialect) {
        Ok(expr) => expr,
        Err(_) => return classify_text(expression),
    };

    let mut has_window = false;
    let mut has_aggregate = false;
    let _ = visit_expressions(&expr, |e| {
        if let Expr::Function(func) = e {
            if func.over.is_some() {
                has_window = true;
            } else if is_aggregate_name(&func.name.to_string()) {
                has_aggregate = true;
            }
        }
        ControlFlow::<()>::Continue(())
    });

    if has_window {
        FragmentKind::Window
    } else if has_aggregate {
        FragmentKind::Aggregate
    } else {
        FragmentKind::Vanilla
    }
}

fn is_aggregate_name(name: &str) -> bool {
    let last = name.rsplit('.').next().unwrap_or(name);
    let bare = last
        .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
        .to_ascii_lowercase();
    AGGREGATE_FUNCTIONS.contains(&bare.as_str())
}

fn classify_text(expression: &str) -> FragmentKind {
    if WINDOW_FALLBACK.is_match(expression) {
        FragmentKind::Window
    } else if AGGREGATE_FALLBACK.is_match(expression) {
        FragmentKind::Aggregate
    } else {
        FragmentKind::Vanilla
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> BTreeMap<String, String> {
        names
            .iter()
            .map(|n| (n.to_string(), "INTEGER".to_string()))
            .collect()
    }

    #[test]
    fn test_parse_expression_rejects_trailing_tokens() {
        assert!(parse_expression("a + 1", Dialect::DuckDb).is_ok());
        assert!(parse_expression("a + 1 b c", Dialect::DuckDb).is_err());
    }

    #[test]
    fn test_validate_sql() {
        validate_sql("SELECT * FROM users", Dialect::Postgres).unwrap();
        validate_sql("SELECT * FROM users", Dialect::MySql).unwrap();
        assert!(validate_sql("SELEC * FORM users", Dialect::Postgres).is_err());
    }

    #[test]
    fn test_qualify_bare_column() {
        let sql = qualify_columns("amount", "m1", &columns(&["amount"]), Dialect::DuckDb);
        assert_eq!(sql, "\"m1\".\"amount\"");
    }

    #[test]
    fn test_qualify_leaves_literals_and_functions() {
        let sql = qualify_columns(
            "SUM(amount) + COUNT(qty) + LENGTH('amount')",
            "m1",
            &columns(&["amount", "qty"]),
            Dialect::DuckDb,
        );
        assert_eq!(
            sql,
            "SUM(\"m1\".\"amount\") + COUNT(\"m1\".\"qty\") + LENGTH('amount')"
        );
    }

    #[test]
    fn test_rename_qualifiers_skips_literals() {
        let renames = vec![("abc123".to_string(), "users".to_string())];
        let sql = rename_qualifiers(
            "\"abc123\".\"name\" <> '\"abc123\".\"name\"'",
            &renames,
            Dialect::DuckDb,
        );
        assert_eq!(sql, "\"users\".\"name\" <> '\"abc123\".\"name\"'");
    }

    #[test]
    fn test_rename_qualifiers_unparsable_falls_back_to_text() {
        let renames = vec![("abc123".to_string(), "users".to_string())];
        let sql = rename_qualifiers("\"abc123\".\"name\" ((", &renames, Dialect::DuckDb);
        assert_eq!(sql, "\"users\".\"name\" ((");
    }

    #[test]
    fn test_qualify_skips_unknown_and_qualified_identifiers() {
        let sql = qualify_columns(
            "\"other\".\"amount\" + price",
            "m1",
            &columns(&["amount"]),
            Dialect::DuckDb,
        );
        assert_eq!(sql, "\"other\".\"amount\" + price");
    }

    #[test]
    fn test_qualify_case_insensitive() {
        let sql = qualify_columns("AMOUNT", "m1", &columns(&["amount"]), Dialect::DuckDb);
        assert_eq!(sql, "\"m1\".\"amount\"");
    }

    #[test]
    fn test_qualify_uses_dialect_quoting() {
        let sql = qualify_columns("amount", "m1", &columns(&["amount"]), Dialect::MySql);
        assert_eq!(sql, "`m1`.`amount`");
    }

    #[test]
    fn test_qualify_unparsable_is_unchanged() {
        let sql = qualify_columns("amount +", "m1", &columns(&["amount"]), Dialect::DuckDb);
        assert_eq!(sql, "amount +");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("x", Dialect::DuckDb), FragmentKind::Vanilla);
        assert_eq!(classify("UPPER(name)", Dialect::DuckDb), FragmentKind::Vanilla);
        assert_eq!(classify("SUM(amount)", Dialect::DuckDb), FragmentKind::Aggregate);
        assert_eq!(
            classify("count(DISTINCT user_id) / 2", Dialect::DuckDb),
            FragmentKind::Aggregate
        );
        assert_eq!(
            classify("SUM(amount) OVER (PARTITION BY region)", Dialect::DuckDb),
            FragmentKind::Window
        );
        assert_eq!(
            classify("ROW_NUMBER() OVER (ORDER BY x) = 1", Dialect::DuckDb),
            FragmentKind::Window
        );
    }

    #[test]
    fn test_classify_fallback_on_parse_error() {
        assert_eq!(classify("SUM(amount) +", Dialect::DuckDb), FragmentKind::Aggregate);
        assert_eq!(classify("rank() over (", Dialect::DuckDb), FragmentKind::Window);
        assert_eq!(classify("a b c", Dialect::DuckDb), FragmentKind::Vanilla);
    }
}
