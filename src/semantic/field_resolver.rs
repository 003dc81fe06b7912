//! Field resolution: `${ref(...)}` tokens to schema-qualified SQL.
//!
//! Three token shapes, relative to the model an expression is evaluated on:
//!
//! 1. `${ref(model).column}` where `column` is in the model's schema:
//!    rendered `"<model_hash>"."column"`.
//! 2. `${ref(name)}` naming a standalone metric or dimension: replaced by its
//!    expression, whose bare columns are then qualified against the calling
//!    model's schema.
//! 3. `${ref(model).name}` naming a metric or dimension declared in `model`:
//!    replaced by its expression qualified against `model`'s schema.
//!
//! Expressions without any token pass through unchanged.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{suggest_closest, SemanticError, SemanticResult};
use super::resolver::MetricResolver;
use crate::cache::{hash_str, SchemaCache};
use crate::model::reference::{extract_refs, has_refs, replace_refs, RefToken};
use crate::model::{Model, Project};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::qualify::{match_column, qualify_columns};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A resolved expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub sql: String,
    /// Column alias for the expression in a SELECT list.
    pub alias: String,
    /// Models whose columns the SQL reads, by name.
    pub models: BTreeSet<String>,
}

#[derive(Default)]
struct Expansion {
    models: BTreeSet<String>,
    /// A standalone metric or dimension was substituted.
    global: bool,
}

/// Resolves expressions against model schemas. One per compile.
#[derive(Debug)]
pub struct FieldResolver<'p> {
    project: &'p Project,
    metrics: MetricResolver<'p>,
    schemas: SchemaCache,
}

impl<'p> FieldResolver<'p> {
    pub fn new(project: &'p Project, schemas: SchemaCache) -> Self {
        Self {
            project,
            metrics: MetricResolver::new(project),
            schemas,
        }
    }

    pub fn metrics(&self) -> &MetricResolver<'p> {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut MetricResolver<'p> {
        &mut self.metrics
    }

    pub fn schemas_mut(&mut self) -> &mut SchemaCache {
        &mut self.schemas
    }

    /// Resolve `expression` as evaluated on `model_name`.
    ///
    /// `context` names the entity the expression belongs to, for errors.
    pub fn resolve(
        &mut self,
        context: &str,
        expression: &str,
        model_name: &str,
        dialect: Dialect,
    ) -> SemanticResult<ResolvedField> {
        let alias = alias_for(expression);
        if !has_refs(expression) {
            return Ok(ResolvedField {
                sql: expression.trim().to_string(),
                alias,
                models: BTreeSet::new(),
            });
        }

        let mut state = Expansion::default();
        let mut sql = self.expand(context, expression, dialect, &mut state)?;

        if state.global {
            let model = self.model(context, model_name)?;
            let columns = self.schemas.columns(model)?.clone();
            sql = qualify_columns(&sql, &model.content_hash(), &columns, dialect);
            state.models.insert(model.name.clone());
        }

        Ok(ResolvedField {
            sql: sql.trim().to_string(),
            alias,
            models: state.models,
        })
    }

    fn expand(
        &mut self,
        context: &str,
        text: &str,
        dialect: Dialect,
        state: &mut Expansion,
    ) -> SemanticResult<String> {
        replace_refs::<SemanticError, _>(text, |token| {
            let replacement = match self.metrics.lookup(context, token)? {
                Some(id) => self.substitute(&id, dialect, state)?,
                None => self.column(context, token, dialect, state)?,
            };
            Ok(Some(replacement))
        })
    }

    /// Parenthesized SQL of a metric or dimension.
    fn substitute(
        &mut self,
        id: &str,
        dialect: Dialect,
        state: &mut Expansion,
    ) -> SemanticResult<String> {
        // Surfaces cycles and ambiguity before any recursion below.
        let resolved = self.metrics.resolve_expression(id)?;
        let Some(entity) = self.metrics.entity(id) else {
            return Ok(format!("({})", resolved));
        };
        state.models.extend(self.metrics.models_referenced_by(id)?);

        match entity.parent {
            Some(parent) => {
                let columns = self.schemas.columns(parent)?.clone();
                let sql = qualify_columns(&resolved, &parent.content_hash(), &columns, dialect);
                Ok(format!("({})", sql))
            }
            None => {
                state.global = true;
                let sql = self.expand(id, entity.expression, dialect, state)?;
                Ok(format!("({})", sql.trim()))
            }
        }
    }

    /// `"<hash>"."column"` for a `${ref(model).column}` token.
    fn column(
        &mut self,
        context: &str,
        token: &RefToken,
        dialect: Dialect,
        state: &mut Expansion,
    ) -> SemanticResult<String> {
        let Some(column) = token.property.as_deref() else {
            return Err(match self.project.model(&token.name) {
                Some(_) => SemanticError::InvalidFieldReference {
                    entity: context.to_string(),
                    reference: token.name.clone(),
                },
                None => SemanticError::UnresolvedReference {
                    entity: context.to_string(),
                    reference: token.name.clone(),
                },
            });
        };

        let model = self.model(context, &token.name)?;
        let columns = self.schemas.columns(model)?;
        let Some(column) = match_column(column, columns) else {
            let available: Vec<String> = columns.keys().cloned().collect();
            return Err(SemanticError::UnknownColumn {
                model: model.name.clone(),
                column: column.to_string(),
                suggestion: suggest_closest(column, &available),
                available,
            });
        };

        let sql = format!(
            "{}.{}",
            dialect.quote_identifier(&model.content_hash()),
            dialect.quote_identifier(column)
        );
        state.models.insert(model.name.clone());
        Ok(sql)
    }

    fn model(&self, context: &str, name: &str) -> SemanticResult<&'p Model> {
        let project = self.project;
        project
            .model(name)
            .ok_or_else(|| SemanticError::UnresolvedReference {
                entity: context.to_string(),
                reference: name.to_string(),
            })
    }
}

/// Alias of an expression in a SELECT list.
///
/// A lone token is named after its property or target, a plain identifier
/// after itself, anything else after a short hash of its text.
pub fn alias_for(expression: &str) -> String {
    let trimmed = expression.trim();
    if let [token] = extract_refs(trimmed).as_slice() {
        if token.span == (0..trimmed.len()) {
            return token.property.clone().unwrap_or_else(|| token.name.clone());
        }
    }
    if IDENTIFIER.is_match(trimmed) {
        return trimmed.to_string();
    }
    format!("expr_{}", &hash_str(trimmed)[..8])
}
