use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constraints::{PrimaryKey, Relationship, UniqueConstraint};
use crate::types::{EnumType, FieldType, Sequence};

/// Immutable snapshot of the tables, relationships and enums of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaGraph {
    pub tables: Vec<Table>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub enums: Vec<EnumType>,
}

impl SchemaGraph {
    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.id() == id)
    }

    /// Qualified table ids in declaration order.
    pub fn table_ids(&self) -> Vec<String> {
        self.tables.iter().map(Table::id).collect()
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships
            .iter()
            .find(|relationship| relationship.name == name)
    }

    /// Relationships where `table_id` is the referencing side.
    pub fn parents_of(&self, table_id: &str) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|relationship| relationship.child == table_id)
            .collect()
    }

    /// Relationships where `table_id` is the referenced side.
    pub fn children_of(&self, table_id: &str) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|relationship| relationship.parent == table_id)
            .collect()
    }

    pub fn enum_type(&self, id: &str) -> Option<&EnumType> {
        self.enums.iter().find(|enum_type| enum_type.id() == id)
    }

    /// Every sequence declared on a field, with its owning table id.
    pub fn sequences(&self) -> impl Iterator<Item = (String, &Sequence)> {
        self.tables.iter().flat_map(|table| {
            let table_id = table.id();
            table
                .fields
                .iter()
                .filter_map(|field| field.sequence.as_ref())
                .map(move |sequence| (table_id.clone(), sequence))
        })
    }
}

/// A relation the engine can generate rows for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraint>,
}

impl Table {
    /// Qualified id (`schema.name`).
    pub fn id(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    /// Primary key plus unique constraints, deduplicated by field list.
    pub fn unique_keys(&self) -> Vec<UniqueConstraint> {
        let mut keys: Vec<UniqueConstraint> = Vec::new();

        if let Some(pk) = &self.primary_key
            && !pk.fields.is_empty()
        {
            keys.push(UniqueConstraint {
                name: pk
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}_pkey", self.name)),
                fields: pk.fields.clone(),
            });
        }

        for unique in &self.unique_constraints {
            if keys.iter().any(|existing| existing.fields == unique.fields) {
                continue;
            }
            keys.push(unique.clone());
        }

        keys
    }
}

/// Column metadata for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_id: bool,
    /// Value computed by the database (generated column or identity).
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default)]
    pub has_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Sequence>,
    /// Set on foreign key fields whose optional parent was filtered out.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub always_null: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            is_nullable: false,
            is_id: false,
            is_generated: false,
            has_default: false,
            sequence: None,
            always_null: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn id(mut self) -> Self {
        self.is_id = true;
        self
    }

    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Identifier resolved from a sequence when the row is finalized.
    pub fn is_sequence_backed(&self) -> bool {
        self.is_id && self.sequence.is_some()
    }

    /// Whether the engine assigns a scalar value for this field.
    ///
    /// Generated non-id columns belong to the database; sequence-backed ids
    /// are drawn from the sequence tracker instead.
    pub fn should_generate(&self) -> bool {
        if self.is_generated && !self.is_id {
            return false;
        }
        !self.is_sequence_backed()
    }
}
