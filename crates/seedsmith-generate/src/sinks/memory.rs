use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use seedsmith_core::Table;
use serde_json::Value;
use tracing::debug;

use super::{quote_ident, quote_table};
use crate::adapter::{PersistBatch, PersistOp, PersistenceSink, ResetRequest, SinkError, StateSource};
use crate::value::{RowValues, row_to_json};

type StoredRow = BTreeMap<String, Value>;

#[derive(Debug, Default)]
struct MemoryState {
    batches: Vec<PersistBatch>,
    statements: Vec<String>,
    tables: BTreeMap<String, Vec<StoredRow>>,
    sequences: BTreeMap<String, i64>,
    reject_at: Option<usize>,
    fail_reset: bool,
}

/// Dry-run sink that keeps everything in memory.
///
/// Records every batch, renders the statements a database sink would run and
/// applies the rows to in-memory tables. Clones share state, so one handle
/// can be given to the session as its sink and state source while another is
/// kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next batch at operation `op_index` without applying any of it.
    pub fn reject_at(&self, op_index: usize) {
        self.state().reject_at = Some(op_index);
    }

    /// Fail the next reset.
    pub fn fail_next_reset(&self) {
        self.state().fail_reset = true;
    }

    /// Store a row as if another writer had inserted it.
    pub fn insert_external(&self, table: &str, row: StoredRow) {
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Move a sequence as if another writer had drawn from it.
    pub fn set_sequence(&self, identifier: &str, next: i64) {
        self.state().sequences.insert(identifier.to_string(), next);
    }

    pub fn batches(&self) -> Vec<PersistBatch> {
        self.state().batches.clone()
    }

    /// Every statement rendered so far, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn sequence(&self, identifier: &str) -> Option<i64> {
        self.state().sequences.get(identifier).copied()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn persist(&mut self, batch: &PersistBatch) -> Result<(), SinkError> {
        let mut state = self.state();
        if let Some(op_index) = state.reject_at.take() {
            return Err(SinkError::at(op_index, "batch rejected by memory sink"));
        }

        let mut tables = state.tables.clone();
        let mut statements = Vec::with_capacity(batch.ops.len() + batch.sequences.len());
        for (index, op) in batch.ops.iter().enumerate() {
            match op {
                PersistOp::Insert { table, values, .. } => {
                    statements.push(render_insert(table, values));
                    tables
                        .entry(table.clone())
                        .or_default()
                        .push(row_to_json(values));
                }
                PersistOp::Update {
                    table, key, values, ..
                } => {
                    statements.push(render_update(table, key, values));
                    let key = row_to_json(key);
                    let row = tables
                        .get_mut(table)
                        .and_then(|rows| {
                            rows.iter_mut().find(|row| {
                                key.iter().all(|(field, value)| row.get(field) == Some(value))
                            })
                        })
                        .ok_or_else(|| {
                            SinkError::at(index, format!("no row of {table} matches update key"))
                        })?;
                    row.extend(row_to_json(values));
                }
            }
        }

        for (identifier, next) in &batch.sequences {
            statements.push(format!("SELECT setval('{identifier}', {next}, false);"));
            let stored = state.sequences.entry(identifier.clone()).or_insert(*next);
            *stored = (*stored).max(*next);
        }

        debug!(
            plan_index = batch.plan_index,
            statements = statements.len(),
            "memory sink applied batch"
        );
        state.tables = tables;
        state.statements.extend(statements);
        state.batches.push(batch.clone());
        Ok(())
    }

    async fn reset(&mut self, request: &ResetRequest) -> Result<(), SinkError> {
        let mut state = self.state();
        if state.fail_reset {
            state.fail_reset = false;
            return Err(SinkError::new("reset rejected by memory sink"));
        }

        for table in &request.tables {
            state.tables.remove(table);
            state
                .statements
                .push(format!("TRUNCATE TABLE {} CASCADE;", quote_table(table)));
        }
        for (identifier, restart) in &request.sequences {
            state.sequences.insert(identifier.clone(), *restart);
            state.statements.push(format!(
                "ALTER SEQUENCE {} RESTART WITH {restart};",
                quote_table(identifier)
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StateSource for MemorySink {
    async fn current_sequences(&self) -> Result<BTreeMap<String, i64>, SinkError> {
        Ok(self.state().sequences.clone())
    }

    async fn existing_rows(&self, table: &Table) -> Result<Vec<StoredRow>, SinkError> {
        Ok(self.rows(&table.id()))
    }
}

fn render_insert(table: &str, values: &RowValues) -> String {
    let columns: Vec<String> = values.keys().map(|name| quote_ident(name)).collect();
    let literals: Vec<String> = values.values().map(|value| value.to_sql_literal()).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_table(table),
        columns.join(", "),
        literals.join(", ")
    )
}

fn render_update(table: &str, key: &RowValues, values: &RowValues) -> String {
    let assignments: Vec<String> = values
        .iter()
        .map(|(name, value)| format!("{} = {}", quote_ident(name), value.to_sql_literal()))
        .collect();
    let predicate: Vec<String> = key
        .iter()
        .map(|(name, value)| format!("{} = {}", quote_ident(name), value.to_sql_literal()))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {};",
        quote_table(table),
        assignments.join(", "),
        predicate.join(" AND ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::GeneratedValue;

    fn batch() -> PersistBatch {
        let mut values = RowValues::new();
        values.insert("id".to_string(), GeneratedValue::Int(1));
        values.insert("name".to_string(), GeneratedValue::Text("O'Hara".to_string()));
        let mut key = RowValues::new();
        key.insert("id".to_string(), GeneratedValue::Int(1));
        let mut patch = RowValues::new();
        patch.insert("manager_id".to_string(), GeneratedValue::Int(1));

        PersistBatch {
            plan_index: 0,
            ops: vec![
                PersistOp::Insert {
                    table: "public.employees".to_string(),
                    ordinal: 0,
                    values,
                },
                PersistOp::Update {
                    table: "public.employees".to_string(),
                    ordinal: 0,
                    key,
                    values: patch,
                },
            ],
            sequences: BTreeMap::from([("public.employees_id_seq".to_string(), 2)]),
        }
    }

    #[test]
    fn renders_quoted_statements() {
        let mut sink = MemorySink::new();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        runtime.block_on(sink.persist(&batch())).expect("persist");

        assert_eq!(
            sink.statements(),
            vec![
                r#"INSERT INTO "public"."employees" ("id", "name") VALUES (1, 'O''Hara');"#
                    .to_string(),
                r#"UPDATE "public"."employees" SET "manager_id" = 1 WHERE "id" = 1;"#.to_string(),
                "SELECT setval('public.employees_id_seq', 2, false);".to_string(),
            ]
        );
        let rows = sink.rows("public.employees");
        assert_eq!(rows[0].get("manager_id"), Some(&Value::from(1)));
        assert_eq!(sink.sequence("public.employees_id_seq"), Some(2));
    }

    #[test]
    fn rejected_batch_leaves_tables_untouched() {
        let mut sink = MemorySink::new();
        sink.reject_at(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");

        let err = runtime.block_on(sink.persist(&batch())).expect_err("rejected");
        assert_eq!(err.op_index, Some(1));
        assert_eq!(err.to_string(), "operation 1: batch rejected by memory sink");
        assert!(sink.rows("public.employees").is_empty());
        assert!(sink.batches().is_empty());

        runtime.block_on(sink.persist(&batch())).expect("second attempt");
        assert_eq!(sink.batches().len(), 1);
    }

    #[test]
    fn failed_reset_reports_a_bare_message() {
        let mut sink = MemorySink::new();
        sink.fail_next_reset();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");

        let err = runtime
            .block_on(sink.reset(&ResetRequest::default()))
            .expect_err("reset rejected");
        assert_eq!(err.op_index, None);
        assert_eq!(err.to_string(), "reset rejected by memory sink");
    }
}
