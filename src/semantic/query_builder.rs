//! SQL assembly for tokenized traces.
//!
//! Every model a trace reads becomes a CTE holding its base SQL. Fields come
//! out of the resolver qualified by model content hash; a single-model query
//! names its CTE after that hash, so fragments are used as-is. A multi-model
//! query names CTEs by sanitized model name and rewrites the qualifiers.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{SemanticError, SemanticResult};
use super::relation_graph::{JoinStep, RelationGraph};
use super::tokenizer::TokenizedTrace;
use crate::cache::hash_str;
use crate::model::reference::replace_refs;
use crate::model::{JoinType, Model, Project};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::qualify::{rename_qualifiers, validate_sql};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Builds trace queries. Alias sanitization is memoized per instance.
#[derive(Debug)]
pub struct QueryBuilder<'p> {
    project: &'p Project,
    aliases: HashMap<String, String>,
    warnings: Vec<String>,
}

impl<'p> QueryBuilder<'p> {
    pub fn new(project: &'p Project) -> Self {
        Self {
            project,
            aliases: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// SQL-safe alias for a model name.
    ///
    /// Identifiers are kept as they are. Anything else keeps its identifier
    /// characters and gains a short hash of the full name, so distinct names
    /// never share an alias.
    pub fn sanitize_model_name(&mut self, name: &str) -> String {
        if let Some(alias) = self.aliases.get(name) {
            return alias.clone();
        }
        let alias = sanitize(name);
        self.aliases.insert(name.to_string(), alias.clone());
        alias
    }

    /// Warnings raised since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn build(
        &mut self,
        tokenized: &TokenizedTrace,
        relations: &RelationGraph,
    ) -> SemanticResult<String> {
        let primary = self.model(tokenized, &tokenized.model)?;
        if tokenized.referenced_models.is_empty() {
            return Ok(self.single_model(tokenized, primary));
        }

        let mut requested = vec![primary.name.clone()];
        requested.extend(tokenized.referenced_models.iter().cloned());
        let path = relations.find_join_path(&requested)?;

        let mut models: Vec<&Model> = vec![primary];
        for step in &path {
            for name in [&step.left, &step.right] {
                if !models.iter().any(|m| &m.name == name) {
                    models.push(self.model(tokenized, name)?);
                }
            }
        }

        let dialect = tokenized.dialect;
        for model in &models {
            if let Err(err) = validate_sql(&model.base_sql(), dialect) {
                tracing::warn!(
                    trace = %tokenized.trace,
                    model = %model.name,
                    error = %err,
                    "model SQL does not parse; returning primary model SQL"
                );
                self.warnings.push(format!(
                    "Trace '{}': SQL of model '{}' could not be parsed; query left unmodified",
                    tokenized.trace, model.name
                ));
                return Ok(primary.base_sql());
            }
        }

        let aliases: Vec<(String, String)> = models
            .iter()
            .map(|m| (m.content_hash(), self.sanitize_model_name(&m.name)))
            .collect();
        let rewrite = |sql: &str| rename_qualifiers(sql, &aliases, dialect);

        let ctes: Vec<String> = models
            .iter()
            .zip(&aliases)
            .map(|(m, (_, alias))| cte(dialect, alias, &m.base_sql()))
            .collect();

        let mut from = dialect.quote_identifier(&aliases[0].1);
        for step in &path {
            from.push('\n');
            from.push_str(&self.join(tokenized, step));
        }

        Ok(render(tokenized, &ctes, &from, rewrite))
    }

    fn single_model(&self, tokenized: &TokenizedTrace, model: &Model) -> String {
        let dialect = tokenized.dialect;
        let hash = model.content_hash();
        let ctes = [cte(dialect, &hash, &model.base_sql())];
        render(
            tokenized,
            &ctes,
            &dialect.quote_identifier(&hash),
            |sql: &str| sql.to_string(),
        )
    }

    fn join(&mut self, tokenized: &TokenizedTrace, step: &JoinStep) -> String {
        let dialect = tokenized.dialect;
        let mut join_type = step.join_type;
        if join_type == JoinType::Full && !dialect.supports_full_outer_join() {
            tracing::warn!(
                trace = %tokenized.trace,
                relation = %step.relation,
                dialect = %dialect,
                "FULL OUTER JOIN unsupported; using LEFT JOIN"
            );
            self.warnings.push(format!(
                "Trace '{}': relation '{}' joined with LEFT JOIN; {} has no FULL OUTER JOIN",
                tokenized.trace, step.relation, dialect
            ));
            join_type = JoinType::Left;
        }

        let condition = self.join_condition(&step.condition, dialect);
        format!(
            "{} {} ON {}",
            join_type.sql_keyword(),
            dialect.quote_identifier(&self.sanitize_model_name(&step.right)),
            condition
        )
    }

    /// Rewrite `${ref(model).column}` tokens into `alias."column"`.
    fn join_condition(&mut self, condition: &str, dialect: Dialect) -> String {
        let rewritten = replace_refs::<Infallible, _>(condition, |token| {
            let alias = dialect.quote_identifier(&self.sanitize_model_name(&token.name));
            Ok(Some(match &token.property {
                Some(column) => format!("{}.{}", alias, dialect.quote_identifier(column)),
                None => alias,
            }))
        });
        match rewritten {
            Ok(sql) => sql.trim().to_string(),
            Err(never) => match never {},
        }
    }

    fn model(&self, tokenized: &TokenizedTrace, name: &str) -> SemanticResult<&'p Model> {
        let project = self.project;
        project
            .model(name)
            .ok_or_else(|| SemanticError::UnresolvedReference {
                entity: tokenized.trace.clone(),
                reference: name.to_string(),
            })
    }
}

fn sanitize(name: &str) -> String {
    if IDENTIFIER.is_match(name) {
        return name.to_string();
    }
    let stripped: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let suffix = &hash_str(name)[..8];
    if stripped.is_empty() || stripped.starts_with(|c: char| c.is_ascii_digit()) {
        format!("m_{}_{}", stripped, suffix)
    } else {
        format!("{}_{}", stripped, suffix)
    }
}

fn cte(dialect: Dialect, name: &str, sql: &str) -> String {
    format!("{} AS (\n{}\n)", dialect.quote_identifier(name), sql)
}

fn render(
    tokenized: &TokenizedTrace,
    ctes: &[String],
    from: &str,
    rewrite: impl Fn(&str) -> String,
) -> String {
    let dialect = tokenized.dialect;
    let mut sql = format!("WITH {}\n", ctes.join(",\n"));

    let select: Vec<String> = tokenized
        .select_items
        .iter()
        .map(|(name, f)| format!("{} AS {}", rewrite(&f.sql), dialect.quote_identifier(name)))
        .collect();
    if select.is_empty() {
        sql.push_str("SELECT *");
    } else {
        sql.push_str("SELECT\n  ");
        sql.push_str(&select.join(",\n  "));
    }

    sql.push_str("\nFROM ");
    sql.push_str(from);

    let clause = |sql: &mut String, keyword: &str, items: Vec<String>, separator: &str| {
        if items.is_empty() {
            return;
        }
        let items: Vec<String> = if items.len() > 1 && separator == " AND " {
            items.iter().map(|i| format!("({})", i)).collect()
        } else {
            items
        };
        sql.push('\n');
        sql.push_str(keyword);
        sql.push(' ');
        sql.push_str(&items.join(separator));
    };
    let rewritten = |items: &[String]| -> Vec<String> { items.iter().map(|i| rewrite(i)).collect() };

    clause(&mut sql, "WHERE", rewritten(&tokenized.filters.vanilla), " AND ");
    if !tokenized.all_select_aggregated() {
        clause(&mut sql, "GROUP BY", rewritten(&tokenized.group_by), ", ");
    }
    clause(&mut sql, "HAVING", rewritten(&tokenized.filters.aggregate), " AND ");
    clause(&mut sql, "QUALIFY", rewritten(&tokenized.filters.window), " AND ");

    let order: Vec<String> = tokenized
        .order_by
        .iter()
        .map(|o| o.with_direction(&rewrite(&o.fragment.sql)))
        .collect();
    clause(&mut sql, "ORDER BY", order, ", ");

    sql
}
