use std::fs;
use std::path::Path;

use seedsmith_core::{SchemaGraph, Selection, filter_schema};
use seedsmith_plan::{
    Count, FieldRule, ParentRequest, Shape, TableRequest, request_json_schema, validate_request,
};

fn load_json(path: &Path) -> serde_json::Value {
    let contents =
        fs::read_to_string(path).unwrap_or_else(|_| panic!("missing json at {}", path.display()));
    serde_json::from_str(&contents).expect("parse json")
}

fn load_blog() -> SchemaGraph {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../seedsmith-core/tests/fixtures/blog.schema.json");
    serde_json::from_value(load_json(&path)).expect("parse schema graph")
}

fn codes(report: &seedsmith_plan::ValidationReport) -> Vec<&str> {
    report.errors.iter().map(|issue| issue.code.as_str()).collect()
}

#[test]
fn fixture_request_validates() {
    let schema = load_blog();
    let path =
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/users_with_posts.request.json");
    let request: TableRequest = serde_json::from_value(load_json(&path)).expect("parse request");

    let report = validate_request(&schema, &request);
    assert!(report.is_ok(), "unexpected errors: {report}");
    assert!(report.warnings.is_empty());
    assert_eq!(
        request.children["posts_author_id_fkey"].count,
        Count::Range { min: 1, max: 2 }
    );
}

#[test]
fn request_json_schema_accepts_fixture() {
    let schema = serde_json::to_value(request_json_schema()).expect("serialize schema");
    let compiled = jsonschema::JSONSchema::compile(&schema).expect("compile schema");
    let path =
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/users_with_posts.request.json");
    assert!(compiled.is_valid(&load_json(&path)));
}

#[test]
fn reports_unknown_names() {
    let schema = load_blog();
    let request = TableRequest::new("public.users")
        .with_field("nickname", FieldRule::constant("x"))
        .with_child("missing_fkey", TableRequest::new("public.posts"));

    let report = validate_request(&schema, &request);
    assert_eq!(codes(&report), vec!["unknown_field", "unknown_relationship"]);
    assert_eq!(report.errors[0].path, "/fields/nickname");

    let report = validate_request(&schema, &TableRequest::new("public.nope"));
    assert_eq!(codes(&report), vec!["unknown_table"]);
}

#[test]
fn rejects_detached_and_mismatched_relationships() {
    let schema = load_blog();
    let request = TableRequest::new("public.users")
        .with_parent("posts_author_id_fkey", ParentRequest::Connect)
        .with_child("comments_post_id_fkey", TableRequest::new("public.comments"));

    let report = validate_request(&schema, &request);
    assert_eq!(
        codes(&report),
        vec!["relationship_not_attached", "relationship_not_attached"]
    );

    let request = TableRequest::new("public.users")
        .with_child("posts_author_id_fkey", TableRequest::new("public.comments"));
    let report = validate_request(&schema, &request);
    assert_eq!(codes(&report), vec!["relationship_table_mismatch"]);
}

#[test]
fn rejects_bad_counts_and_overrides() {
    let schema = load_blog();
    let request = TableRequest::new("public.posts")
        .with_range(5, 2)
        .with_field("id", FieldRule::constant(10))
        .with_parent("posts_author_id_fkey", ParentRequest::Null);

    let report = validate_request(&schema, &request);
    assert_eq!(
        codes(&report),
        vec![
            "invalid_count",
            "sequence_override",
            "null_required_relationship"
        ]
    );
}

#[test]
fn rejects_overrides_of_filtered_references() {
    let schema = load_blog();
    let selection = Selection::parse(&["!public.employees"]).expect("rules");
    let filtered = filter_schema(&schema, &selection).expect("filter");

    let report = validate_request(&filtered, &TableRequest::new("public.employees"));
    assert_eq!(codes(&report), vec!["unknown_table"]);

    let mut schema = load_blog();
    if let Some(field) = schema
        .tables
        .iter_mut()
        .find(|table| table.name == "comments")
        .and_then(|table| table.field_mut("reviewer_id"))
    {
        field.always_null = true;
    }
    let request =
        TableRequest::new("public.comments").with_field("reviewer_id", FieldRule::constant(1));
    let report = validate_request(&schema, &request);
    assert_eq!(codes(&report), vec!["always_null_override"]);
}

#[test]
fn validates_nested_parent_requests() {
    let schema = load_blog();
    let request = TableRequest::new("public.comments")
        .with_parent(
            "comments_post_id_fkey",
            ParentRequest::Create(Box::new(
                TableRequest::new("public.posts")
                    .with_field("title", FieldRule::pattern("[unclosed")),
            )),
        )
        .with_parent("comments_reviewer_id_fkey", ParentRequest::Null)
        .with_field("post_id", FieldRule::constant(1));

    let report = validate_request(&schema, &request);
    assert_eq!(codes(&report), vec!["invalid_pattern"]);
    assert_eq!(
        report.errors[0].path,
        "/parents/comments_post_id_fkey/create/fields/title"
    );
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].code, "relationship_field_override");
}

#[test]
fn shape_on_enum_field_is_only_a_warning() {
    let schema = load_blog();
    let request =
        TableRequest::new("public.users").with_field("mood", FieldRule::shape(Shape::Email));

    let report = validate_request(&schema, &request);
    assert!(report.is_ok(), "unexpected errors: {report}");
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].code, "shape_on_enum");
    assert!(report.warnings[0].message.contains("a label is drawn"));
}
