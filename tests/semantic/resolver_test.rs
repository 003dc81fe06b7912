//! Integration tests for metric and dimension resolution.

use trellis::model::reference::has_refs;
use trellis::model::{Dimension, Metric, Model, Project};
use trellis::semantic::{MetricResolver, SemanticError};

fn project() -> Project {
    Project::new("shop")
        .with_model(
            Model::sql("orders", "SELECT * FROM raw.orders")
                .with_metric(Metric::new("gross", "SUM(amount)"))
                .with_dimension(Dimension::new("is_big", "amount > 100")),
        )
        .with_metric(Metric::new("net", "${ref(orders).gross} - SUM(${ref(orders).discount})"))
        .with_metric(Metric::new("net_k", "${ref(net)} / 1000"))
        .with_metric(Metric::new("net_k_label", "CONCAT(${ref(net_k)}, 'k')"))
        .with_dimension(Dimension::new("big_flag", "CASE WHEN ${ref(orders).is_big} THEN 1 ELSE 0 END"))
}

#[test]
fn test_chain_substitutes_parenthesized_sql() {
    let project = project();
    let mut resolver = MetricResolver::new(&project);

    let resolved = resolver.resolve_expression("net_k_label").unwrap();
    assert_eq!(
        resolved,
        "CONCAT(((SUM(amount)) - SUM(${ref(orders).discount})) / 1000, 'k')"
    );
}

#[test]
fn test_nested_dimension_substituted() {
    let project = project();
    let mut resolver = MetricResolver::new(&project);
    assert_eq!(
        resolver.resolve_expression("big_flag").unwrap(),
        "CASE WHEN (amount > 100) THEN 1 ELSE 0 END"
    );
}

#[test]
fn test_resolve_by_qualified_and_unqualified_name() {
    let project = project();
    let mut resolver = MetricResolver::new(&project);
    assert_eq!(resolver.resolve_expression("orders.gross").unwrap(), "SUM(amount)");
    assert_eq!(resolver.resolve_expression("gross").unwrap(), "SUM(amount)");
}

#[test]
fn test_resolve_all_in_dependency_order() {
    let project = project();
    let resolver = MetricResolver::new(&project);
    let order = resolver.topological_order().unwrap();

    let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
    assert!(pos("orders.gross") < pos("net"));
    assert!(pos("net") < pos("net_k"));
    assert!(pos("net_k") < pos("net_k_label"));
    assert!(pos("orders.is_big") < pos("big_flag"));
}

#[test]
fn test_only_column_refs_remain() {
    let project = project();
    let mut resolver = MetricResolver::new(&project);
    let all = resolver.resolve_all().unwrap();

    assert_eq!(all.len(), 6);
    assert!(!has_refs(&all["orders.gross"]));
    assert!(!has_refs(&all["big_flag"]));
    // Column references are left for field resolution.
    assert!(all["net"].contains("${ref(orders).discount}"));
}

#[test]
fn test_cycle_detected_without_validation() {
    let project = project()
        .with_metric(Metric::new("m1", "${ref(m2)} + 1"))
        .with_metric(Metric::new("m2", "${ref(m1)} * 2"));
    let mut resolver = MetricResolver::new(&project);

    let err = resolver.resolve_expression("m1").unwrap_err();
    assert_eq!(
        err,
        SemanticError::CircularDependency {
            cycle: vec!["m1".into(), "m2".into(), "m1".into()]
        }
    );
    assert_eq!(resolver.resolve_all().unwrap_err().kind(), "circular_dependency");
}

#[test]
fn test_self_reference() {
    let project = project().with_metric(Metric::new("loop", "${ref(loop)}"));
    let mut resolver = MetricResolver::new(&project);
    let err = resolver.resolve_expression("loop").unwrap_err();
    assert_eq!(err.cycle(), Some(&["loop".to_string(), "loop".to_string()][..]));
}

#[test]
fn test_unknown_name() {
    let project = project();
    let mut resolver = MetricResolver::new(&project);
    let err = resolver.resolve_expression("missing").unwrap_err();
    assert_eq!(err.kind(), "unresolved_reference");
}

#[test]
fn test_models_referenced_by_chain() {
    let project = project();
    let resolver = MetricResolver::new(&project);
    let models = resolver.models_referenced_by("net_k_label").unwrap();
    assert_eq!(models.into_iter().collect::<Vec<_>>(), vec!["orders".to_string()]);
}
