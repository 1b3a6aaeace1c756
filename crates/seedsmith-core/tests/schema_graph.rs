use std::fs;
use std::path::Path;

use schemars::schema_for;
use seedsmith_core::{
    Error, SchemaGraph, Selection, TypeFamily, analyze_dependencies, filter_schema,
    validate_schema,
};

fn load_blog() -> SchemaGraph {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/blog.schema.json");
    let contents =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing json at {}", path.display()));
    serde_json::from_str(&contents).expect("parse schema graph")
}

#[test]
fn fixture_is_a_valid_graph() {
    let schema = load_blog();
    validate_schema(&schema).expect("valid schema");

    let users = schema.table("public.users").expect("users table");
    assert_eq!(users.unique_keys().len(), 2);
    assert_eq!(
        users.field("mood").map(|field| field.field_type.family()),
        Some(TypeFamily::Enum)
    );
    assert_eq!(schema.sequences().count(), 4);
}

#[test]
fn dependency_order_puts_parents_first() {
    let schema = load_blog();
    let report = analyze_dependencies(&schema);

    assert_eq!(
        report.order,
        vec![
            "public._audit_log",
            "public.employees",
            "public.users",
            "public.posts",
            "public.comments",
        ]
    );
    assert!(report.is_deferred("employees_manager_id_fkey"));
    assert!(report.unsatisfiable.is_empty());
}

#[test]
fn excluding_a_required_parent_is_a_selection_error() {
    let schema = load_blog();
    let selection = Selection::parse(&["!public.users"]).expect("rules");

    match filter_schema(&schema, &selection) {
        Err(Error::Selection(err)) => {
            assert_eq!(err.table, "public.posts");
            assert_eq!(err.relationship, "posts_author_id_fkey");
            assert_eq!(err.parent, "public.users");
        }
        other => panic!("expected selection error, got {other:?}"),
    }
}

#[test]
fn excluding_an_optional_parent_nulls_the_reference() {
    let mut schema = load_blog();
    for relationship in &mut schema.relationships {
        if relationship.name == "posts_author_id_fkey" {
            relationship.is_nullable = true;
        }
    }

    let selection = Selection::parse(&["!public.users", "!public._*"]).expect("rules");
    let filtered = filter_schema(&schema, &selection).expect("filter");

    assert_eq!(
        filtered.table_ids(),
        vec!["public.posts", "public.comments", "public.employees"]
    );
    let comments = filtered.table("public.comments").expect("comments");
    assert!(comments.field("reviewer_id").expect("reviewer_id").always_null);
    assert!(!comments.field("post_id").expect("post_id").always_null);
    assert!(filtered.relationship("comments_reviewer_id_fkey").is_none());
    validate_schema(&filtered).expect("filtered graph stays valid");
}

#[test]
fn json_schema_describes_the_snapshot() {
    let schema = schema_for!(SchemaGraph);
    let json = serde_json::to_value(&schema).expect("serialize json schema");
    let properties = json
        .get("properties")
        .and_then(|value| value.as_object())
        .expect("properties");
    assert!(properties.contains_key("tables"));
    assert!(properties.contains_key("relationships"));
}
