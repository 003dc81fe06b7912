//! Integration tests for join planning over declared relations.

use trellis::model::{JoinType, Model, Project, Relation};
use trellis::semantic::{RelationGraph, RelationWarning, SemanticError};

fn models(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn project() -> Project {
    Project::new("shop")
        .with_model(Model::sql("orders", "SELECT 1"))
        .with_model(Model::sql("users", "SELECT 1"))
        .with_model(Model::sql("products", "SELECT 1"))
        .with_model(Model::sql("countries", "SELECT 1"))
        .with_model(Model::sql("warehouses", "SELECT 1"))
        .with_relation(Relation::new(
            "orders_users",
            "${ref(orders).user_id} = ${ref(users).id}",
        ))
        .with_relation(
            Relation::new(
                "orders_products",
                "${ref(orders).product_id} = ${ref(products).id}",
            )
            .with_join_type(JoinType::Left),
        )
        .with_relation(Relation::new(
            "users_countries",
            "${ref(users).country_id} = ${ref(countries).id}",
        ))
}

#[test]
fn test_two_models_one_edge() {
    let graph = RelationGraph::new(&project()).unwrap();
    let path = graph.find_join_path(&models(&["orders", "users"])).unwrap();

    assert_eq!(path.len(), 1);
    assert_eq!(path[0].left, "orders");
    assert_eq!(path[0].right, "users");
    assert_eq!(path[0].relation, "orders_users");
}

#[test]
fn test_three_models_two_edges_no_extra_model() {
    let graph = RelationGraph::new(&project()).unwrap();
    let path = graph
        .find_join_path(&models(&["orders", "users", "products"]))
        .unwrap();

    assert_eq!(path.len(), 2);
    for step in &path {
        for model in [&step.left, &step.right] {
            assert!(["orders", "users", "products"].contains(&model.as_str()));
        }
    }
}

#[test]
fn test_three_models_join_intermediate_only_once() {
    let graph = RelationGraph::new(&project()).unwrap();
    let path = graph
        .find_join_path(&models(&["orders", "countries", "products"]))
        .unwrap();

    let joined: Vec<&str> = path.iter().map(|s| s.right.as_str()).collect();
    assert_eq!(joined, vec!["products", "users", "countries"]);
}

#[test]
fn test_direct_relations_beat_detour() {
    let project = project()
        .with_relation(Relation::new(
            "products_countries",
            "${ref(products).origin_id} = ${ref(countries).id}",
        ))
        .with_relation(Relation::new(
            "orders_countries",
            "${ref(orders).ship_country_id} = ${ref(countries).id}",
        ));
    let graph = RelationGraph::new(&project).unwrap();
    let path = graph
        .find_join_path(&models(&["orders", "countries", "products"]))
        .unwrap();

    assert_eq!(path.len(), 2);
    assert!(path.iter().all(|s| s.left != "users" && s.right != "users"));
}

#[test]
fn test_intermediate_model_is_joined() {
    let graph = RelationGraph::new(&project()).unwrap();
    let path = graph
        .find_join_path(&models(&["orders", "countries"]))
        .unwrap();

    let joined: Vec<&str> = path.iter().map(|s| s.right.as_str()).collect();
    assert_eq!(joined, vec!["users", "countries"]);
}

#[test]
fn test_reverse_traversal_flips_join_type() {
    let graph = RelationGraph::new(&project()).unwrap();
    let path = graph
        .find_join_path(&models(&["products", "orders"]))
        .unwrap();

    assert_eq!(path[0].left, "products");
    assert_eq!(path[0].right, "orders");
    assert_eq!(path[0].join_type, JoinType::Right);
}

#[test]
fn test_no_relation_between_models() {
    let graph = RelationGraph::new(&project()).unwrap();
    let err = graph
        .find_join_path(&models(&["orders", "warehouses"]))
        .unwrap_err();

    assert!(matches!(err, SemanticError::NoJoinPath { .. }));
    assert!(err.to_string().contains("warehouses"));
}

#[test]
fn test_single_model_needs_no_join() {
    let graph = RelationGraph::new(&project()).unwrap();
    assert!(graph.find_join_path(&models(&["orders"])).unwrap().is_empty());
    assert!(graph
        .find_join_path(&models(&["orders", "orders"]))
        .unwrap()
        .is_empty());
}

#[test]
fn test_default_relation_preferred() {
    let project = project().with_relation(
        Relation::new(
            "orders_buyers",
            "${ref(orders).buyer_id} = ${ref(users).id}",
        )
        .as_default(),
    );
    let graph = RelationGraph::new(&project).unwrap();
    let path = graph.find_join_path(&models(&["orders", "users"])).unwrap();
    assert_eq!(path[0].relation, "orders_buyers");
    assert_eq!(graph.relations_between("orders", "users").len(), 2);
}

#[test]
fn test_connected_models_and_warnings() {
    let graph = RelationGraph::new(&project()).unwrap();

    let connected: Vec<String> = graph.get_connected_models("orders").into_iter().collect();
    assert_eq!(connected, models(&["countries", "products", "users"]));

    let warnings = graph.validate();
    assert_eq!(
        warnings,
        vec![RelationWarning::IsolatedModel {
            model: "warehouses".to_string()
        }]
    );
}
