//! Integration tests for project validation.
//!
//! Every rule is checked through `validate_project`, and the collected
//! errors through the serialized `ErrorReport`.

use trellis::model::{Dimension, EntityKind, Metric, Model, Project, Relation, Source, SourceKind, Trace};
use trellis::semantic::{validate_project, ErrorReport, SemanticError};

fn project() -> Project {
    Project::new("shop")
        .with_default_source("ref(warehouse)")
        .with_source(Source::new("warehouse", SourceKind::DuckDb))
        .with_model(
            Model::sql("orders", "SELECT * FROM raw.orders")
                .with_metric(Metric::new("total", "SUM(amount)"))
                .with_dimension(Dimension::new("bucket", "CASE WHEN amount > 100 THEN 'big' ELSE 'small' END")),
        )
        .with_model(Model::sql("users", "SELECT * FROM raw.users"))
        .with_metric(Metric::new("revenue", "SUM(${ref(orders).amount})"))
        .with_metric(Metric::new("revenue_k", "${ref(revenue)} / 1000"))
        .with_metric(Metric::new("scaled_total", "${ref(orders).total} * 2"))
        .with_dimension(Dimension::new("country", "${ref(users).country}"))
        .with_relation(Relation::new(
            "orders_users",
            "${ref(orders).user_id} = ${ref(users).id}",
        ))
        .with_trace(
            Trace::new("revenue_by_country", "ref(orders)")
                .with_prop("x", "?{${ref(country)}}")
                .with_prop("y", "?{${ref(revenue)}}"),
        )
}

fn kinds(errors: &[SemanticError]) -> Vec<&'static str> {
    errors.iter().map(SemanticError::kind).collect()
}

// ============================================================================
// Valid projects
// ============================================================================

#[test]
fn test_valid_project_is_acyclic() {
    let graph = validate_project(&project()).expect("project should validate");
    assert!(graph.is_acyclic());
    assert!(graph.has_edge("revenue_k", "revenue"));
    assert!(graph.has_edge("revenue", "orders"));
    assert!(graph.has_edge("orders.total", "orders"));
    assert!(graph.has_edge("orders", "warehouse"));
    assert!(graph.has_edge("revenue_by_country", "country"));
}

#[test]
fn test_base_model_through_chain() {
    let graph = validate_project(&project()).unwrap();
    assert_eq!(
        graph.descendants_of_type(EntityKind::Model, Some("revenue_k")),
        vec!["orders"]
    );
}

// ============================================================================
// Collected errors
// ============================================================================

#[test]
fn test_errors_are_collected_not_short_circuited() {
    let project = project()
        .with_metric(Metric::new("constant", "1"))
        .with_metric(Metric::new("dangling", "SUM(${ref(nowhere).x})"))
        .with_dimension(Dimension::new("wrong_kind", "${ref(revenue)}"));

    let errors = validate_project(&project).unwrap_err();
    let found = kinds(&errors);
    assert!(found.contains(&"no_base_model"));
    assert!(found.contains(&"unresolved_reference"));
    assert!(found.contains(&"invalid_reference_kind"));
}

#[test]
fn test_cycle_names_every_member() {
    let project = project()
        .with_metric(Metric::new("a", "${ref(b)} + 1"))
        .with_metric(Metric::new("b", "${ref(c)} + 1"))
        .with_metric(Metric::new("c", "${ref(a)} + 1"));

    let errors = validate_project(&project).unwrap_err();
    assert_eq!(errors.len(), 1);
    let cycle = errors[0].cycle().expect("cycle path");
    assert_eq!(cycle.first(), cycle.last());
    for name in ["a", "b", "c"] {
        assert!(cycle.iter().any(|n| n == name), "{name} missing from {cycle:?}");
    }
}

#[test]
fn test_ambiguous_unqualified_reference() {
    let project = project()
        .with_model(
            Model::sql("refunds", "SELECT * FROM raw.refunds")
                .with_metric(Metric::new("total", "SUM(amount)")),
        )
        .with_metric(Metric::new("which", "${ref(total)} + 1"));

    let errors = validate_project(&project).unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        SemanticError::AmbiguousReference { candidates, .. }
            if candidates == &vec!["orders.total".to_string(), "refunds.total".to_string()]
    )));
}

#[test]
fn test_duplicate_top_level_names() {
    let project = project().with_dimension(Dimension::new("revenue", "${ref(orders).amount}"));
    let errors = validate_project(&project).unwrap_err();
    assert!(kinds(&errors).contains(&"duplicate_name"));
}

#[test]
fn test_error_report_json() {
    let project = project()
        .with_metric(Metric::new("m1", "${ref(m2)}"))
        .with_metric(Metric::new("m2", "${ref(m1)}"));
    let errors = validate_project(&project).unwrap_err();
    let report = ErrorReport::from_errors(&errors);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["errors"][0]["kind"], "circular_dependency");
    assert_eq!(json["errors"][0]["cycle"], serde_json::json!(["m1", "m2", "m1"]));
    assert!(json["errors"][0]["message"]
        .as_str()
        .unwrap()
        .starts_with("Circular dependency detected"));
}
