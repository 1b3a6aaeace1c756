//! Session-scoped registry of every row the engine knows about.
//!
//! Rows are kept per table in insertion order together with one key index per
//! unique key of the table (primary key first). While a transaction is open,
//! every mutation is journaled so a failed plan can be undone exactly.

use std::collections::{BTreeMap, HashMap};

use seedsmith_core::{SchemaGraph, UniqueConstraint};
use serde::Serialize;

use crate::errors::{GenerationError, Result};
use crate::value::{GeneratedValue, RowValues};

const KEY_SEPARATOR: &str = "\u{1f}";

/// A row registered in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedRow {
    pub table: String,
    /// Stable per-table position, assigned when the row is started.
    pub ordinal: usize,
    /// Path the row's seeds are derived from (`plan/table/ordinal`).
    pub seed_path: String,
    pub values: RowValues,
    /// Reported by the state source rather than generated.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

impl GeneratedRow {
    pub fn get(&self, field: &str) -> Option<&GeneratedValue> {
        self.values.get(field)
    }
}

/// A unique key already held by another row.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyConflict {
    pub constraint: UniqueConstraint,
    pub values: Vec<GeneratedValue>,
    /// Ordinal of the row holding the key.
    pub existing: usize,
}

#[derive(Debug, Clone, Default)]
struct TableRows {
    rows: Vec<GeneratedRow>,
    positions: HashMap<usize, usize>,
    /// One index per unique key, parallel to the table's key list.
    indices: Vec<HashMap<String, usize>>,
    next_ordinal: usize,
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Reserved {
        table: String,
        previous: usize,
    },
    Registered {
        table: String,
    },
    Patched {
        table: String,
        ordinal: usize,
        field: String,
        previous: GeneratedValue,
    },
}

/// In-memory row registry with uniqueness indices and rollback.
#[derive(Debug, Clone, Default)]
pub struct RowStore {
    keys: BTreeMap<String, Vec<UniqueConstraint>>,
    tables: BTreeMap<String, TableRows>,
    journal: Option<Vec<JournalEntry>>,
}

impl RowStore {
    pub fn new(schema: &SchemaGraph) -> Self {
        let keys: BTreeMap<String, Vec<UniqueConstraint>> = schema
            .tables
            .iter()
            .map(|table| (table.id(), table.unique_keys()))
            .collect();
        let tables = keys
            .iter()
            .map(|(id, keys)| (id.clone(), TableRows::with_keys(keys.len())))
            .collect();
        Self {
            keys,
            tables,
            journal: None,
        }
    }

    /// Start journaling mutations.
    pub fn begin(&mut self) {
        if self.journal.is_none() {
            self.journal = Some(Vec::new());
        }
    }

    /// Keep every mutation made since `begin`.
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo every mutation made since `begin`.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };

        for entry in journal.into_iter().rev() {
            match entry {
                JournalEntry::Reserved { table, previous } => {
                    if let Some(rows) = self.tables.get_mut(&table) {
                        rows.next_ordinal = previous;
                    }
                }
                JournalEntry::Registered { table } => {
                    let keys = self.keys.get(&table).map(Vec::as_slice).unwrap_or(&[]);
                    if let Some(rows) = self.tables.get_mut(&table) {
                        let position = rows.rows.len().saturating_sub(1);
                        rows.unindex(keys, position);
                        if let Some(row) = rows.rows.pop() {
                            rows.positions.remove(&row.ordinal);
                        }
                    }
                }
                JournalEntry::Patched {
                    table,
                    ordinal,
                    field,
                    previous,
                } => {
                    let keys = self.keys.get(&table).map(Vec::as_slice).unwrap_or(&[]);
                    if let Some(rows) = self.tables.get_mut(&table)
                        && let Some(&position) = rows.positions.get(&ordinal)
                    {
                        rows.unindex(keys, position);
                        rows.rows[position].values.insert(field, previous);
                        rows.index(keys, position);
                    }
                }
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    /// Unique keys (primary key first) of a table.
    pub fn unique_keys(&self, table: &str) -> &[UniqueConstraint] {
        self.keys.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Claim the next ordinal of a table.
    pub fn reserve(&mut self, table: &str) -> Result<usize> {
        let rows = self.tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let ordinal = rows.next_ordinal;
        rows.next_ordinal += 1;
        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry::Reserved {
                table: table.to_string(),
                previous: ordinal,
            });
        }
        Ok(ordinal)
    }

    /// Rows of a table in insertion order.
    pub fn rows(&self, table: &str) -> &[GeneratedRow] {
        self.tables
            .get(table)
            .map(|rows| rows.rows.as_slice())
            .unwrap_or(&[])
    }

    /// Existing rows a relationship may connect to.
    pub fn candidates(&self, table: &str) -> &[GeneratedRow] {
        self.rows(table)
    }

    pub fn row(&self, table: &str, ordinal: usize) -> Option<&GeneratedRow> {
        let rows = self.tables.get(table)?;
        rows.positions
            .get(&ordinal)
            .and_then(|position| rows.rows.get(*position))
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|rows| rows.rows.len()).sum()
    }

    /// Whether `key` is held under `constraint` of `table`.
    pub fn is_taken(&self, table: &str, constraint: &str, key: &str) -> bool {
        let (Some(keys), Some(rows)) = (self.keys.get(table), self.tables.get(table)) else {
            return false;
        };
        keys.iter()
            .position(|unique| unique.name == constraint)
            .and_then(|index| rows.indices.get(index))
            .is_some_and(|index| index.contains_key(key))
    }

    /// First unique key of `table` that `values` would violate.
    ///
    /// Keys with a NULL or missing component never conflict. The row holding
    /// ordinal `ignore` is not considered a conflict with itself.
    pub fn find_conflict(
        &self,
        table: &str,
        values: &RowValues,
        ignore: Option<usize>,
    ) -> Option<KeyConflict> {
        let keys = self.keys.get(table)?;
        let rows = self.tables.get(table)?;

        for (unique, index) in keys.iter().zip(&rows.indices) {
            let Some(key) = key_for(unique, values) else {
                continue;
            };
            if let Some(&existing) = index.get(&key)
                && Some(existing) != ignore
            {
                return Some(KeyConflict {
                    constraint: unique.clone(),
                    values: unique
                        .fields
                        .iter()
                        .map(|field| values.get(field).cloned().unwrap_or(GeneratedValue::Null))
                        .collect(),
                    existing,
                });
            }
        }

        None
    }

    /// Register a finished row under its reserved ordinal.
    pub fn register(&mut self, row: GeneratedRow) -> Result<()> {
        if let Some(conflict) = self.find_conflict(&row.table, &row.values, None) {
            return Err(GenerationError::Configuration(format!(
                "row {} of '{}' violates unique key '{}'",
                row.ordinal, row.table, conflict.constraint.name
            )));
        }

        let table = row.table.clone();
        let keys = self.keys.get(&table).map(Vec::as_slice).unwrap_or(&[]);
        let rows = self.tables.get_mut(&table).ok_or_else(|| unknown_table(&table))?;
        let position = rows.rows.len();
        rows.positions.insert(row.ordinal, position);
        rows.rows.push(row);
        rows.index(keys, position);

        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry::Registered { table });
        }
        Ok(())
    }

    /// Overwrite one field of a registered row, keeping indices in sync.
    pub fn patch(
        &mut self,
        table: &str,
        ordinal: usize,
        field: &str,
        value: GeneratedValue,
    ) -> Result<()> {
        let mut values = self
            .row(table, ordinal)
            .map(|row| row.values.clone())
            .ok_or_else(|| {
                GenerationError::Configuration(format!(
                    "row {ordinal} of '{table}' is not registered"
                ))
            })?;
        values.insert(field.to_string(), value.clone());
        if let Some(conflict) = self.find_conflict(table, &values, Some(ordinal)) {
            return Err(GenerationError::Configuration(format!(
                "patching {table}.{field} of row {ordinal} violates unique key '{}'",
                conflict.constraint.name
            )));
        }

        let keys = self.keys.get(table).map(Vec::as_slice).unwrap_or(&[]);
        let rows = self.tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let position = rows.positions[&ordinal];
        rows.unindex(keys, position);
        let previous = rows.rows[position]
            .values
            .insert(field.to_string(), value)
            .unwrap_or(GeneratedValue::Null);
        rows.index(keys, position);

        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry::Patched {
                table: table.to_string(),
                ordinal,
                field: field.to_string(),
                previous,
            });
        }
        Ok(())
    }

    /// Forget every row, index and ordinal of the given tables.
    pub fn reset_tables<S: AsRef<str>>(&mut self, tables: &[S]) {
        for table in tables {
            let table = table.as_ref();
            let width = self.keys.get(table).map(Vec::len).unwrap_or(0);
            if let Some(rows) = self.tables.get_mut(table) {
                *rows = TableRows::with_keys(width);
            }
        }
    }

    /// Track a row that exists in the store but was not generated here.
    ///
    /// Returns `false` when one of its keys is already tracked.
    pub fn absorb_external(&mut self, table: &str, values: RowValues) -> Result<bool> {
        if self.find_conflict(table, &values, None).is_some() {
            return Ok(false);
        }
        let ordinal = self.reserve(table)?;
        self.register(GeneratedRow {
            table: table.to_string(),
            ordinal,
            seed_path: format!("external/{table}/{ordinal}"),
            values,
            external: true,
        })?;
        Ok(true)
    }
}

impl TableRows {
    fn with_keys(width: usize) -> Self {
        Self {
            indices: vec![HashMap::new(); width],
            ..Self::default()
        }
    }

    fn index(&mut self, keys: &[UniqueConstraint], position: usize) {
        let Some(row) = self.rows.get(position) else {
            return;
        };
        for (unique, index) in keys.iter().zip(self.indices.iter_mut()) {
            if let Some(key) = key_for(unique, &row.values) {
                index.insert(key, row.ordinal);
            }
        }
    }

    fn unindex(&mut self, keys: &[UniqueConstraint], position: usize) {
        let Some(row) = self.rows.get(position) else {
            return;
        };
        for (unique, index) in keys.iter().zip(self.indices.iter_mut()) {
            if let Some(key) = key_for(unique, &row.values)
                && index.get(&key) == Some(&row.ordinal)
            {
                index.remove(&key);
            }
        }
    }
}

/// Index key of `values` under `unique`; `None` when a component is NULL or missing.
pub fn key_for(unique: &UniqueConstraint, values: &RowValues) -> Option<String> {
    let mut parts = Vec::with_capacity(unique.fields.len());
    for field in &unique.fields {
        match values.get(field) {
            None | Some(GeneratedValue::Null) => return None,
            Some(value) => parts.push(value.key()),
        }
    }
    Some(parts.join(KEY_SEPARATOR))
}

fn unknown_table(table: &str) -> GenerationError {
    GenerationError::Configuration(format!("table '{table}' is not part of the session schema"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedsmith_core::{Field, FieldType, PrimaryKey, Table};

    fn schema() -> SchemaGraph {
        SchemaGraph {
            tables: vec![Table {
                schema: "public".to_string(),
                name: "users".to_string(),
                fields: vec![
                    Field::new("id", FieldType::new("int4")).id(),
                    Field::new("email", FieldType::new("text")).nullable(),
                ],
                primary_key: Some(PrimaryKey {
                    name: None,
                    fields: vec!["id".to_string()],
                }),
                unique_constraints: vec![UniqueConstraint::new("users_email_key", &["email"])],
            }],
            relationships: Vec::new(),
            enums: Vec::new(),
        }
    }

    fn values(id: i64, email: Option<&str>) -> RowValues {
        let mut values = RowValues::new();
        values.insert("id".to_string(), GeneratedValue::Int(id));
        values.insert(
            "email".to_string(),
            email
                .map(|email| GeneratedValue::Text(email.to_string()))
                .unwrap_or(GeneratedValue::Null),
        );
        values
    }

    fn add(store: &mut RowStore, id: i64, email: Option<&str>) {
        let ordinal = store.reserve("public.users").expect("reserve");
        store
            .register(GeneratedRow {
                table: "public.users".to_string(),
                ordinal,
                seed_path: format!("0/public.users/{ordinal}"),
                values: values(id, email),
                external: false,
            })
            .expect("register");
    }

    #[test]
    fn detects_conflicts_per_constraint() {
        let mut store = RowStore::new(&schema());
        add(&mut store, 1, Some("a@acme.com"));

        let conflict = store
            .find_conflict("public.users", &values(2, Some("a@acme.com")), None)
            .expect("conflict");
        assert_eq!(conflict.constraint.name, "users_email_key");
        assert_eq!(conflict.existing, 0);

        let conflict = store
            .find_conflict("public.users", &values(1, Some("b@acme.com")), None)
            .expect("conflict");
        assert_eq!(conflict.constraint.name, "users_pkey");
        assert!(store.is_taken("public.users", "users_email_key", "a@acme.com"));
    }

    #[test]
    fn null_keys_never_collide() {
        let mut store = RowStore::new(&schema());
        add(&mut store, 1, None);
        assert!(
            store
                .find_conflict("public.users", &values(2, None), None)
                .is_none()
        );
        add(&mut store, 2, None);
        assert_eq!(store.rows("public.users").len(), 2);
    }

    #[test]
    fn rollback_restores_rows_indices_and_ordinals() {
        let mut store = RowStore::new(&schema());
        add(&mut store, 1, Some("a@acme.com"));

        store.begin();
        add(&mut store, 2, Some("b@acme.com"));
        store
            .patch(
                "public.users",
                0,
                "email",
                GeneratedValue::Text("z@acme.com".to_string()),
            )
            .expect("patch");
        store.rollback();

        assert_eq!(store.rows("public.users").len(), 1);
        assert_eq!(
            store.row("public.users", 0).and_then(|row| row.get("email")),
            Some(&GeneratedValue::Text("a@acme.com".to_string()))
        );
        assert!(store.is_taken("public.users", "users_email_key", "a@acme.com"));
        assert!(!store.is_taken("public.users", "users_email_key", "z@acme.com"));
        assert!(!store.is_taken("public.users", "users_email_key", "b@acme.com"));
        assert_eq!(store.reserve("public.users").expect("reserve"), 1);
    }

    #[test]
    fn patch_rejects_duplicates() {
        let mut store = RowStore::new(&schema());
        add(&mut store, 1, Some("a@acme.com"));
        add(&mut store, 2, Some("b@acme.com"));
        let err = store
            .patch(
                "public.users",
                1,
                "email",
                GeneratedValue::Text("a@acme.com".to_string()),
            )
            .expect_err("duplicate");
        assert!(err.to_string().contains("users_email_key"));
    }

    #[test]
    fn reset_and_absorb() {
        let mut store = RowStore::new(&schema());
        add(&mut store, 1, Some("a@acme.com"));
        store.reset_tables(&["public.users"]);
        assert!(store.rows("public.users").is_empty());
        assert_eq!(store.reserve("public.users").expect("reserve"), 0);

        assert!(
            store
                .absorb_external("public.users", values(10, Some("x@acme.com")))
                .expect("absorb")
        );
        assert!(
            !store
                .absorb_external("public.users", values(10, Some("y@acme.com")))
                .expect("absorb")
        );
        let row = &store.rows("public.users")[0];
        assert!(row.external);
        assert_eq!(row.ordinal, 1);
    }
}
