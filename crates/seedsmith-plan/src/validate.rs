use regex::Regex;
use seedsmith_core::{Relationship, SchemaGraph, Table};

use crate::errors::{ValidationIssue, ValidationReport};
use crate::model::{Count, FieldRule, ParentRequest, TableRequest, Template};

/// Validate a request tree against the session's schema graph.
///
/// Every problem found is reported; nothing short-circuits except a table
/// that cannot be resolved at all.
pub fn validate_request(schema: &SchemaGraph, request: &TableRequest) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_node(schema, request, None, "", &mut report);
    report
}

fn validate_node(
    schema: &SchemaGraph,
    request: &TableRequest,
    inherited: Option<&Relationship>,
    base_path: &str,
    report: &mut ValidationReport,
) {
    let Some(table) = schema.table(&request.table) else {
        report.push_error(
            ValidationIssue::error(
                "unknown_table",
                format!("{base_path}/table"),
                format!("table '{}' not found in schema graph", request.table),
            )
            .with_hint("use a qualified id (schema.name) of a selected table"),
        );
        return;
    };

    validate_count(request.count, base_path, report);

    for (name, rule) in &request.fields {
        validate_field(schema, table, name, rule, base_path, report);
    }

    for (name, parent) in &request.parents {
        let path = format!("{base_path}/parents/{name}");
        let Some(relationship) = attached(schema, name, &request.table, true, &path, report)
        else {
            continue;
        };

        if inherited.is_some_and(|rel| rel.name == relationship.name) {
            report.push_error(ValidationIssue::error(
                "relationship_inherited",
                path.clone(),
                format!(
                    "relationship '{name}' is already provided by the enclosing request"
                ),
            ));
        }

        match parent {
            ParentRequest::Create(parent_request) => {
                if parent_request.table != relationship.parent {
                    report.push_error(ValidationIssue::error(
                        "relationship_table_mismatch",
                        format!("{path}/create/table"),
                        format!(
                            "relationship '{name}' points at '{}', not '{}'",
                            relationship.parent, parent_request.table
                        ),
                    ));
                    continue;
                }
                if parent_request.count != Count::Exact(1) {
                    report.push_warning(ValidationIssue::warning(
                        "parent_count_ignored",
                        format!("{path}/create/count"),
                        "exactly one parent row is created per child row",
                    ));
                }
                validate_node(
                    schema,
                    parent_request,
                    None,
                    &format!("{path}/create"),
                    report,
                );
            }
            ParentRequest::Connect => {}
            ParentRequest::Null => {
                if !relationship.is_nullable {
                    report.push_error(
                        ValidationIssue::error(
                            "null_required_relationship",
                            path.clone(),
                            format!("relationship '{name}' is not nullable"),
                        )
                        .with_hint("use create or connect for required relationships"),
                    );
                }
            }
        }

        for field in &relationship.from_fields {
            if request.fields.contains_key(field) {
                report.push_warning(ValidationIssue::warning(
                    "relationship_field_override",
                    format!("{base_path}/fields/{field}"),
                    format!("field '{field}' is set explicitly and by relationship '{name}'"),
                ));
            }
        }
    }

    for (name, child) in &request.children {
        let path = format!("{base_path}/children/{name}");
        let Some(relationship) = attached(schema, name, &request.table, false, &path, report)
        else {
            continue;
        };

        if child.table != relationship.child {
            report.push_error(ValidationIssue::error(
                "relationship_table_mismatch",
                format!("{path}/table"),
                format!(
                    "relationship '{name}' is owned by '{}', not '{}'",
                    relationship.child, child.table
                ),
            ));
            continue;
        }

        validate_node(schema, child, Some(relationship), &path, report);
    }
}

fn attached<'a>(
    schema: &'a SchemaGraph,
    name: &str,
    table_id: &str,
    as_child: bool,
    path: &str,
    report: &mut ValidationReport,
) -> Option<&'a Relationship> {
    let Some(relationship) = schema.relationship(name) else {
        report.push_error(ValidationIssue::error(
            "unknown_relationship",
            path,
            format!("relationship '{name}' not found in schema graph"),
        ));
        return None;
    };

    let endpoint = if as_child {
        &relationship.child
    } else {
        &relationship.parent
    };
    if endpoint != table_id {
        let side = if as_child { "child" } else { "parent" };
        report.push_error(ValidationIssue::error(
            "relationship_not_attached",
            path,
            format!("relationship '{name}' does not have '{table_id}' as its {side}"),
        ));
        return None;
    }

    Some(relationship)
}

fn validate_count(count: Count, base_path: &str, report: &mut ValidationReport) {
    match count {
        Count::Range { min, max } if min > max => {
            report.push_error(ValidationIssue::error(
                "invalid_count",
                format!("{base_path}/count"),
                format!("count range min ({min}) exceeds max ({max})"),
            ));
        }
        Count::Exact(0) | Count::Range { max: 0, .. } => {
            report.push_warning(ValidationIssue::warning(
                "count_zero",
                format!("{base_path}/count"),
                "request creates no rows",
            ));
        }
        _ => {}
    }
}

fn validate_field(
    schema: &SchemaGraph,
    table: &Table,
    name: &str,
    rule: &FieldRule,
    base_path: &str,
    report: &mut ValidationReport,
) {
    let path = format!("{base_path}/fields/{name}");
    let Some(field) = table.field(name) else {
        report.push_error(ValidationIssue::error(
            "unknown_field",
            path,
            format!("field '{}.{}' not found in schema graph", table.id(), name),
        ));
        return;
    };

    if field.is_sequence_backed() {
        report.push_error(
            ValidationIssue::error(
                "sequence_override",
                path,
                format!("field '{}.{}' is drawn from a sequence", table.id(), name),
            )
            .with_hint("remove the override; identifiers are assigned on insert"),
        );
        return;
    }

    if field.is_generated && !field.is_id {
        report.push_error(ValidationIssue::error(
            "generated_override",
            path,
            format!("field '{}.{}' is computed by the database", table.id(), name),
        ));
        return;
    }

    if field.always_null {
        report.push_error(
            ValidationIssue::error(
                "always_null_override",
                path,
                format!(
                    "field '{}.{}' references a table excluded by the selection",
                    table.id(),
                    name
                ),
            )
            .with_hint("include the referenced table in the select rules"),
        );
        return;
    }

    match rule {
        FieldRule::Constant(value) if value.is_null() && !field.is_nullable => {
            report.push_error(ValidationIssue::error(
                "null_not_allowed",
                path,
                format!("field '{}.{}' is not nullable", table.id(), name),
            ));
        }
        FieldRule::OneOf(values) if values.is_empty() => {
            report.push_error(ValidationIssue::error(
                "empty_domain",
                path,
                "one_of requires at least one value",
            ));
        }
        FieldRule::Template(Template::Pattern(pattern)) => {
            if let Err(err) = Regex::new(pattern) {
                report.push_error(ValidationIssue::error(
                    "invalid_pattern",
                    path,
                    format!("pattern '{pattern}' does not compile: {err}"),
                ));
            }
        }
        FieldRule::Template(Template::Shape(_)) | FieldRule::Template(Template::Auto) => {
            if let Some(enum_ref) = &field.field_type.enum_ref
                && schema.enum_type(enum_ref).is_some()
                && matches!(rule, FieldRule::Template(Template::Shape(_)))
            {
                report.push_warning(ValidationIssue::warning(
                    "shape_on_enum",
                    path,
                    format!("field '{name}' is an enum; the shape is ignored and a label is drawn"),
                ));
            }
        }
        _ => {}
    }
}
