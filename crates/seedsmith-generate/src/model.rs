use std::collections::BTreeMap;

use serde::Serialize;

use crate::adapter::PersistBatch;

/// Summary of the rows a plan produced for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows_generated: u64,
    /// Rows whose relationship reused an existing parent.
    pub rows_connected: u64,
    /// Salted attempts spent on unique-key collisions.
    pub retries: u64,
    /// Deferred references filled after insert.
    pub patches: u64,
    /// Sequence values skipped because the key was already taken.
    pub sequence_skips: u64,
}

/// Report for one plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanReport {
    pub plan_index: u64,
    pub tables: BTreeMap<String, TableReport>,
    pub rows_total: u64,
    pub retries_total: u64,
    pub duration_ms: u64,
}

impl PlanReport {
    pub fn new(plan_index: u64) -> Self {
        Self {
            plan_index,
            ..Self::default()
        }
    }

    pub fn table_mut(&mut self, table: &str) -> &mut TableReport {
        self.tables
            .entry(table.to_string())
            .or_insert_with(|| TableReport {
                table: table.to_string(),
                ..TableReport::default()
            })
    }

    pub fn record_row(&mut self, table: &str) {
        self.table_mut(table).rows_generated += 1;
        self.rows_total += 1;
    }

    pub fn record_connect(&mut self, table: &str) {
        self.table_mut(table).rows_connected += 1;
    }

    pub fn record_retry(&mut self, table: &str) {
        self.table_mut(table).retries += 1;
        self.retries_total += 1;
    }

    pub fn record_patch(&mut self, table: &str) {
        self.table_mut(table).patches += 1;
    }

    pub fn record_sequence_skip(&mut self, table: &str) {
        self.table_mut(table).sequence_skips += 1;
    }
}

/// Batch and report returned by `plan` and `seed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedOutcome {
    pub batch: PersistBatch,
    pub report: PlanReport,
    /// Whether the batch reached the persistence sink.
    pub persisted: bool,
}
