use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::schema::SchemaGraph;

/// Validate internal consistency of a schema graph.
///
/// This checks:
/// - duplicate tables/fields/relationships
/// - primary key and unique constraint fields exist and are non-empty
/// - relationship endpoints exist, have matching arity and target a key of the parent
/// - enum-typed fields reference a known enum
pub fn validate_schema(schema: &SchemaGraph) -> Result<()> {
    let mut catalog: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for table in &schema.tables {
        let table_id = table.id();
        if catalog.contains_key(&table_id) {
            return Err(Error::InvalidSchema(format!(
                "duplicate table id: {table_id}"
            )));
        }

        let mut fields = BTreeSet::new();
        for field in &table.fields {
            if !fields.insert(field.name.clone()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate field name: {}.{}",
                    table_id, field.name
                )));
            }

            if let Some(enum_ref) = &field.field_type.enum_ref
                && schema.enum_type(enum_ref).is_none()
            {
                return Err(Error::InvalidSchema(format!(
                    "enum type not found for {}.{}: {}",
                    table_id, field.name, enum_ref
                )));
            }
        }

        catalog.insert(table_id, fields);
    }

    for table in &schema.tables {
        let table_id = table.id();
        let fields = catalog.get(&table_id).ok_or_else(|| {
            Error::InvalidSchema(format!("missing table in catalog: {table_id}"))
        })?;

        if let Some(pk) = &table.primary_key {
            for field in &pk.fields {
                if !fields.contains(field) {
                    return Err(Error::InvalidSchema(format!(
                        "primary key field not found: {table_id}.{field}"
                    )));
                }
            }
        }

        for unique in &table.unique_constraints {
            if unique.fields.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "unique constraint '{}' on {} has no fields",
                    unique.name, table_id
                )));
            }
            for field in &unique.fields {
                if !fields.contains(field) {
                    return Err(Error::InvalidSchema(format!(
                        "unique field not found: {table_id}.{field}"
                    )));
                }
            }
        }
    }

    let mut relationship_names = BTreeSet::new();
    for relationship in &schema.relationships {
        if !relationship_names.insert(relationship.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate relationship name: {}",
                relationship.name
            )));
        }

        if relationship.from_fields.is_empty()
            || relationship.from_fields.len() != relationship.to_fields.len()
        {
            return Err(Error::InvalidSchema(format!(
                "relationship '{}' maps {} field(s) onto {}",
                relationship.name,
                relationship.from_fields.len(),
                relationship.to_fields.len()
            )));
        }

        let child_fields = catalog.get(&relationship.child).ok_or_else(|| {
            Error::InvalidSchema(format!(
                "relationship '{}' child table not found: {}",
                relationship.name, relationship.child
            ))
        })?;
        for field in &relationship.from_fields {
            if !child_fields.contains(field) {
                return Err(Error::InvalidSchema(format!(
                    "relationship '{}' field not found: {}.{}",
                    relationship.name, relationship.child, field
                )));
            }
        }

        let parent = schema.table(&relationship.parent).ok_or_else(|| {
            Error::InvalidSchema(format!(
                "relationship '{}' parent table not found: {}",
                relationship.name, relationship.parent
            ))
        })?;
        for field in &relationship.to_fields {
            if parent.field(field).is_none() {
                return Err(Error::InvalidSchema(format!(
                    "relationship '{}' referenced field not found: {}.{}",
                    relationship.name, relationship.parent, field
                )));
            }
        }

        let targets: BTreeSet<&String> = relationship.to_fields.iter().collect();
        let keyed = parent
            .unique_keys()
            .iter()
            .any(|key| key.fields.iter().collect::<BTreeSet<_>>() == targets);
        if !keyed {
            return Err(Error::InvalidSchema(format!(
                "relationship '{}' must reference a primary key or unique constraint of {}",
                relationship.name, relationship.parent
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{PrimaryKey, Relationship, UniqueConstraint};
    use crate::schema::{Field, Table};
    use crate::types::FieldType;

    fn users() -> Table {
        Table {
            schema: "public".to_string(),
            name: "users".to_string(),
            fields: vec![
                Field::new("id", FieldType::new("int4")).id(),
                Field::new("email", FieldType::new("text")),
            ],
            primary_key: Some(PrimaryKey {
                name: None,
                fields: vec!["id".to_string()],
            }),
            unique_constraints: vec![UniqueConstraint::new("users_email_key", &["email"])],
        }
    }

    fn posts() -> Table {
        Table {
            schema: "public".to_string(),
            name: "posts".to_string(),
            fields: vec![
                Field::new("id", FieldType::new("int4")).id(),
                Field::new("author_email", FieldType::new("text")),
            ],
            primary_key: Some(PrimaryKey {
                name: None,
                fields: vec!["id".to_string()],
            }),
            unique_constraints: Vec::new(),
        }
    }

    fn relationship(to_field: &str) -> Relationship {
        Relationship {
            name: "posts_author_fk".to_string(),
            parent: "public.users".to_string(),
            child: "public.posts".to_string(),
            from_fields: vec!["author_email".to_string()],
            to_fields: vec![to_field.to_string()],
            is_nullable: false,
        }
    }

    #[test]
    fn accepts_relationship_to_unique_field() {
        let schema = SchemaGraph {
            tables: vec![users(), posts()],
            relationships: vec![relationship("email")],
            enums: Vec::new(),
        };
        validate_schema(&schema).expect("valid schema");
    }

    #[test]
    fn rejects_relationship_to_unkeyed_field() {
        let mut table = users();
        table.unique_constraints.clear();
        let schema = SchemaGraph {
            tables: vec![table, posts()],
            relationships: vec![relationship("email")],
            enums: Vec::new(),
        };
        let err = validate_schema(&schema).expect_err("unkeyed target");
        assert!(err.to_string().contains("primary key or unique"));
    }

    #[test]
    fn rejects_duplicate_fields() {
        let mut table = users();
        table.fields.push(Field::new("email", FieldType::new("text")));
        let schema = SchemaGraph {
            tables: vec![table],
            relationships: Vec::new(),
            enums: Vec::new(),
        };
        let err = validate_schema(&schema).expect_err("duplicate field");
        assert!(err.to_string().contains("duplicate field name"));
    }

    #[test]
    fn rejects_mismatched_arity() {
        let mut rel = relationship("email");
        rel.to_fields.push("id".to_string());
        let schema = SchemaGraph {
            tables: vec![users(), posts()],
            relationships: vec![rel],
            enums: Vec::new(),
        };
        assert!(validate_schema(&schema).is_err());
    }
}
