use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Primary key definition preserving field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PrimaryKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub fields: Vec<String>,
}

/// Unique constraint definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UniqueConstraint {
    pub name: String,
    pub fields: Vec<String>,
}

impl UniqueConstraint {
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }

    pub fn covers(&self, field: &str) -> bool {
        self.fields.iter().any(|name| name == field)
    }
}

/// Foreign key edge between two tables.
///
/// `from_fields` live on the child table and point at `to_fields` on the
/// parent, position by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    pub name: String,
    /// Qualified id of the referenced table.
    pub parent: String,
    /// Qualified id of the referencing table.
    pub child: String,
    pub from_fields: Vec<String>,
    pub to_fields: Vec<String>,
    #[serde(default)]
    pub is_nullable: bool,
}

impl Relationship {
    pub fn is_self_reference(&self) -> bool {
        self.parent == self.child
    }

    /// Pairs of `(child field, parent field)`.
    pub fn field_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.from_fields
            .iter()
            .map(String::as_str)
            .zip(self.to_fields.iter().map(String::as_str))
    }
}
