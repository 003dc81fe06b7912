//! Trace entity - a chart definition.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use super::reference::ref_name;

static QUERY_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*\?\{(.*)\}\s*$").unwrap());

static QUERY_WITH_DIRECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*\?\{(.*)\}\s*(asc|desc)\s*$").unwrap());

/// A chart property value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum PropValue {
    /// SQL evaluated per row of the chart's query (written `?{ ... }`).
    Query(String),
    /// A literal display value passed through untouched.
    Static(serde_json::Value),
}

impl PropValue {
    /// Interpret a raw JSON value, recognising `?{ ... }` query strings.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => match query_body(&s) {
                Some(sql) => PropValue::Query(sql),
                None => PropValue::Static(serde_json::Value::String(s)),
            },
            other => PropValue::Static(other),
        }
    }

    pub fn as_query(&self) -> Option<&str> {
        match self {
            PropValue::Query(sql) => Some(sql),
            PropValue::Static(_) => None,
        }
    }
}

impl From<serde_json::Value> for PropValue {
    fn from(value: serde_json::Value) -> Self {
        PropValue::from_json(value)
    }
}

impl Serialize for PropValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropValue::Query(sql) => serializer.serialize_str(&format!("?{{{}}}", sql)),
            PropValue::Static(value) => value.serialize(serializer),
        }
    }
}

/// Body of a `?{ ... }` query string, trimmed.
pub fn query_body(text: &str) -> Option<String> {
    QUERY_STRING
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// Strip the `?{ ... }` wrapper if present.
pub fn unwrap_query(text: &str) -> String {
    query_body(text).unwrap_or_else(|| text.trim().to_string())
}

/// Sort expression with the wrapper stripped. The direction may sit
/// outside the braces (`?{region} DESC`).
pub fn unwrap_order(text: &str) -> String {
    match QUERY_WITH_DIRECTION.captures(text) {
        Some(caps) => format!("{} {}", caps[1].trim(), caps[2].to_ascii_uppercase()),
        None => unwrap_query(text),
    }
}

fn query_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().map(|s| unwrap_query(s)).collect())
}

fn order_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().map(|s| unwrap_order(s)).collect())
}

fn optional_query<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(unwrap_query))
}

/// A chart definition.
///
/// SQL-bearing fields hold bare SQL; `?{ }` wrappers are stripped both by
/// the builders and on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Primary model (`ref(name)` or plain name).
    pub model: String,

    /// Flattened display properties keyed by dotted path (`marker.color`).
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,

    /// Row filters, each a boolean SQL expression.
    #[serde(default, deserialize_with = "query_list")]
    pub filters: Vec<String>,

    /// Sort expressions, optionally suffixed with `ASC` or `DESC`.
    #[serde(default, deserialize_with = "order_list")]
    pub order_by: Vec<String>,

    /// Expression that splits the chart into one series per value.
    #[serde(
        default,
        deserialize_with = "optional_query",
        skip_serializing_if = "Option::is_none"
    )]
    pub cohort_on: Option<String>,
}

impl Trace {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: None,
            model: model.into(),
            props: BTreeMap::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            cohort_on: None,
        }
    }

    /// Add a query prop. The `?{ }` wrapper is optional.
    pub fn with_prop(mut self, path: impl Into<String>, sql: impl AsRef<str>) -> Self {
        self.props
            .insert(path.into(), PropValue::Query(unwrap_query(sql.as_ref())));
        self
    }

    pub fn with_static_prop(mut self, path: impl Into<String>, value: serde_json::Value) -> Self {
        self.props.insert(path.into(), PropValue::Static(value));
        self
    }

    /// Merge a nested props object, flattening it into dotted paths.
    pub fn with_props_json(mut self, props: &serde_json::Value) -> Self {
        flatten_props("", props, &mut self.props);
        self
    }

    pub fn with_filter(mut self, filter: impl AsRef<str>) -> Self {
        self.filters.push(unwrap_query(filter.as_ref()));
        self
    }

    pub fn with_order_by(mut self, order: impl AsRef<str>) -> Self {
        self.order_by.push(unwrap_order(order.as_ref()));
        self
    }

    pub fn with_cohort_on(mut self, cohort: impl AsRef<str>) -> Self {
        self.cohort_on = Some(unwrap_query(cohort.as_ref()));
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Primary model name, with `ref()` wrapping removed.
    pub fn model_name(&self) -> String {
        ref_name(&self.model)
    }

    /// Query props in path order.
    pub fn query_props(&self) -> impl Iterator<Item = (&str, &str)> {
        self.props
            .iter()
            .filter_map(|(path, value)| value.as_query().map(|sql| (path.as_str(), sql)))
    }

    /// Every SQL snippet the trace carries: query props, filters, sort
    /// expressions and the cohort expression.
    pub fn sql_snippets(&self) -> Vec<&str> {
        self.query_props()
            .map(|(_, sql)| sql)
            .chain(self.filters.iter().map(String::as_str))
            .chain(self.order_by.iter().map(String::as_str))
            .chain(self.cohort_on.as_deref())
            .collect()
    }
}

fn flatten_props(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, PropValue>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_props(&path, child, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), PropValue::from_json(other.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_body() {
        assert_eq!(query_body("?{ SUM(amount) }").as_deref(), Some("SUM(amount)"));
        assert_eq!(query_body("bar"), None);
        assert_eq!(unwrap_query("x > 1"), "x > 1");
    }

    #[test]
    fn test_props_json_flattening() {
        let trace = Trace::new("t", "ref(orders)").with_props_json(&json!({
            "type": "bar",
            "x": "?{ region }",
            "marker": {"color": "?{ CASE WHEN x > 1 THEN 'red' END }", "size": 4}
        }));

        assert_eq!(trace.model_name(), "orders");
        let queries: Vec<_> = trace.query_props().collect();
        assert_eq!(
            queries,
            vec![
                ("marker.color", "CASE WHEN x > 1 THEN 'red' END"),
                ("x", "region")
            ]
        );
        assert_eq!(
            trace.props.get("marker.size"),
            Some(&PropValue::Static(json!(4)))
        );
        assert_eq!(trace.props.get("type"), Some(&PropValue::Static(json!("bar"))));
    }

    #[test]
    fn test_prop_value_serde() {
        let trace: Trace = serde_json::from_value(json!({
            "name": "t",
            "model": "orders",
            "props": {"x": "?{region}", "type": "bar"}
        }))
        .unwrap();
        assert_eq!(trace.props["x"], PropValue::Query("region".into()));
        assert_eq!(trace.props["type"], PropValue::Static(json!("bar")));

        let out = serde_json::to_value(&trace.props).unwrap();
        assert_eq!(out, json!({"type": "bar", "x": "?{region}"}));
    }

    #[test]
    fn test_unwrap_order_keeps_outer_direction() {
        assert_eq!(unwrap_order("?{region} desc"), "region DESC");
        assert_eq!(unwrap_order("?{ region DESC }"), "region DESC");
        assert_eq!(unwrap_order("region ASC"), "region ASC");
    }

    #[test]
    fn test_sql_fields_unwrapped_on_deserialize() {
        let trace: Trace = serde_json::from_value(json!({
            "name": "t",
            "model": "ref(orders)",
            "filters": ["?{region = 'A'}", "amount > 0"],
            "order_by": ["?{region} DESC", "?{amount}"],
            "cohort_on": "?{segment}"
        }))
        .unwrap();
        assert_eq!(trace.filters, vec!["region = 'A'", "amount > 0"]);
        assert_eq!(trace.order_by, vec!["region DESC", "amount"]);
        assert_eq!(trace.cohort_on.as_deref(), Some("segment"));

        let reloaded: Trace =
            serde_json::from_value(serde_json::to_value(&trace).unwrap()).unwrap();
        assert_eq!(reloaded, trace);
    }

    #[test]
    fn test_sql_snippets_cover_everything() {
        let trace = Trace::new("t", "orders")
            .with_prop("x", "?{region}")
            .with_filter("?{amount > 0}")
            .with_order_by("region DESC")
            .with_cohort_on("?{segment}");
        assert_eq!(
            trace.sql_snippets(),
            vec!["region", "amount > 0", "region DESC", "segment"]
        );
    }
}
