//! Trace tokenization.
//!
//! Flattens a trace's SQL snippets into resolved, classified fragments: the
//! SELECT items keyed by prop path, filters bucketed by where they belong in
//! the query, the GROUP BY candidates and the ORDER BY list.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{SemanticError, SemanticResult};
use super::field_resolver::{FieldResolver, ResolvedField};
use crate::model::Trace;
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::qualify::{classify, FragmentKind};

static SORT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(.*?)\s+(asc|desc)\s*$").unwrap());

/// Select item name used for a trace's cohort expression.
pub const COHORT_ITEM: &str = "cohort_on";

/// What to do with filters on window results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFilters {
    /// Keep them where the dialect can filter window results (`QUALIFY`).
    #[default]
    Auto,
    /// Always drop them.
    Drop,
}

/// A resolved SQL fragment and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub sql: String,
    pub kind: FragmentKind,
}

/// Filters split by the clause they go in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterBuckets {
    /// `WHERE`
    pub vanilla: Vec<String>,
    /// `HAVING`
    pub aggregate: Vec<String>,
    /// `QUALIFY`
    pub window: Vec<String>,
}

impl FilterBuckets {
    pub fn push(&mut self, kind: FragmentKind, sql: String) {
        match kind {
            FragmentKind::Vanilla => self.vanilla.push(sql),
            FragmentKind::Aggregate => self.aggregate.push(sql),
            FragmentKind::Window => self.window.push(sql),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vanilla.is_empty() && self.aggregate.is_empty() && self.window.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vanilla.len() + self.aggregate.len() + self.window.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub fragment: Fragment,
    pub direction: Option<SortDirection>,
}

impl OrderItem {
    pub fn to_sql(&self) -> String {
        self.with_direction(&self.fragment.sql)
    }

    /// `sql` followed by this item's sort direction, if any.
    pub fn with_direction(&self, sql: &str) -> String {
        match self.direction {
            Some(SortDirection::Asc) => format!("{} ASC", sql),
            Some(SortDirection::Desc) => format!("{} DESC", sql),
            None => sql.to_string(),
        }
    }
}

/// A trace broken down into query parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenizedTrace {
    pub trace: String,
    /// Primary model name.
    pub model: String,
    pub dialect: Dialect,
    pub select_items: BTreeMap<String, Fragment>,
    pub filters: FilterBuckets,
    /// Non-aggregate fragments from SELECT, ORDER BY and the cohort, in
    /// first-seen order without duplicates.
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderItem>,
    /// Models other than the primary one that fragments read from.
    pub referenced_models: BTreeSet<String>,
    pub warnings: Vec<String>,
}

impl TokenizedTrace {
    fn new(trace: &Trace, model: String, dialect: Dialect) -> Self {
        Self {
            trace: trace.name.clone(),
            model,
            dialect,
            select_items: BTreeMap::new(),
            filters: FilterBuckets::default(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            referenced_models: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// True when every SELECT item is an aggregate or window fragment.
    pub fn all_select_aggregated(&self) -> bool {
        self.select_items
            .values()
            .all(|f| f.kind != FragmentKind::Vanilla)
    }

    fn add_group_candidate(&mut self, fragment: &Fragment) {
        if fragment.kind.is_groupable() && !self.group_by.contains(&fragment.sql) {
            self.group_by.push(fragment.sql.clone());
        }
    }
}

/// Turns traces into [`TokenizedTrace`]s using a shared field resolver.
pub struct TraceTokenizer<'a, 'p> {
    fields: &'a mut FieldResolver<'p>,
    window_filters: WindowFilters,
}

impl<'a, 'p> TraceTokenizer<'a, 'p> {
    pub fn new(fields: &'a mut FieldResolver<'p>) -> Self {
        Self {
            fields,
            window_filters: WindowFilters::default(),
        }
    }

    pub fn with_window_filters(mut self, window_filters: WindowFilters) -> Self {
        self.window_filters = window_filters;
        self
    }

    pub fn tokenize(&mut self, trace: &Trace, dialect: Dialect) -> SemanticResult<TokenizedTrace> {
        let model = trace.model_name();
        if self.fields.metrics().project().model(&model).is_none() {
            return Err(SemanticError::UnresolvedReference {
                entity: trace.name.clone(),
                reference: model,
            });
        }

        let mut out = TokenizedTrace::new(trace, model, dialect);

        for (path, sql) in trace.query_props() {
            let fragment = self.fragment(trace, sql, &mut out)?;
            out.add_group_candidate(&fragment);
            out.select_items.insert(path.to_string(), fragment);
        }

        if let Some(cohort) = &trace.cohort_on {
            let fragment = self.fragment(trace, cohort, &mut out)?;
            out.add_group_candidate(&fragment);
            out.select_items.insert(COHORT_ITEM.to_string(), fragment);
        }

        for order in &trace.order_by {
            let (expression, direction) = split_direction(order);
            let fragment = self.fragment(trace, expression, &mut out)?;
            out.add_group_candidate(&fragment);
            out.order_by.push(OrderItem {
                fragment,
                direction,
            });
        }

        for filter in &trace.filters {
            let fragment = self.fragment(trace, filter, &mut out)?;
            if fragment.kind == FragmentKind::Window && !self.keeps_window_filters(dialect) {
                tracing::warn!(
                    trace = %trace.name,
                    dialect = %dialect,
                    filter = %fragment.sql,
                    "window filter dropped"
                );
                out.warnings.push(format!(
                    "Trace '{}': window filter '{}' dropped; {} cannot filter window results",
                    trace.name, fragment.sql, dialect
                ));
                continue;
            }
            out.filters.push(fragment.kind, fragment.sql);
        }

        tracing::debug!(
            trace = %trace.name,
            select = out.select_items.len(),
            filters = out.filters.len(),
            models = ?out.referenced_models,
            "tokenized trace"
        );
        Ok(out)
    }

    fn keeps_window_filters(&self, dialect: Dialect) -> bool {
        self.window_filters == WindowFilters::Auto && dialect.supports_qualify()
    }

    fn fragment(
        &mut self,
        trace: &Trace,
        sql: &str,
        out: &mut TokenizedTrace,
    ) -> SemanticResult<Fragment> {
        let ResolvedField { sql, models, .. } =
            self.fields.resolve(&trace.name, sql, &out.model, out.dialect)?;
        out.referenced_models
            .extend(models.into_iter().filter(|m| *m != out.model));
        let kind = classify(&sql, out.dialect);
        Ok(Fragment { sql, kind })
    }
}

/// Split a trailing `ASC`/`DESC` off an order expression.
pub fn split_direction(order: &str) -> (&str, Option<SortDirection>) {
    let Some(caps) = SORT_SUFFIX.captures(order) else {
        return (order.trim(), None);
    };
    let expression = caps.get(1).map_or("", |m| m.as_str()).trim();
    let direction = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(d) if d == "desc" => SortDirection::Desc,
        _ => SortDirection::Asc,
    };
    (expression, Some(direction))
}
