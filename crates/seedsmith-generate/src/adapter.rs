use std::collections::BTreeMap;

use async_trait::async_trait;
use seedsmith_core::Table;
use serde::Serialize;
use serde_json::Value;

use crate::value::RowValues;

/// One statement of a persisted batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PersistOp {
    Insert {
        table: String,
        ordinal: usize,
        values: RowValues,
    },
    /// Fill deferred references of a row inserted earlier.
    Update {
        table: String,
        ordinal: usize,
        /// Unique key identifying the row.
        key: RowValues,
        values: RowValues,
    },
}

impl PersistOp {
    pub fn table(&self) -> &str {
        match self {
            PersistOp::Insert { table, .. } | PersistOp::Update { table, .. } => table,
        }
    }

    pub fn ordinal(&self) -> usize {
        match self {
            PersistOp::Insert { ordinal, .. } | PersistOp::Update { ordinal, .. } => *ordinal,
        }
    }

    /// Values written by the statement.
    pub fn values(&self) -> &RowValues {
        match self {
            PersistOp::Insert { values, .. } | PersistOp::Update { values, .. } => values,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, PersistOp::Insert { .. })
    }
}

/// Ordered statements produced by one plan, parents before children.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistBatch {
    pub plan_index: u64,
    pub ops: Vec<PersistOp>,
    /// Next value every touched sequence must hand out after the batch.
    pub sequences: BTreeMap<String, i64>,
}

impl PersistBatch {
    pub fn inserts(&self) -> impl Iterator<Item = &PersistOp> {
        self.ops.iter().filter(|op| op.is_insert())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Destructive reset of a set of tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetRequest {
    pub tables: Vec<String>,
    /// Value each owned sequence restarts at.
    pub sequences: BTreeMap<String, i64>,
}

/// Failure reported by a sink or a state source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{message}", operation_prefix(.op_index))]
pub struct SinkError {
    /// Index of the failing operation in the batch, when known.
    pub op_index: Option<usize>,
    pub message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            op_index: None,
            message: message.into(),
        }
    }

    pub fn at(op_index: usize, message: impl Into<String>) -> Self {
        Self {
            op_index: Some(op_index),
            message: message.into(),
        }
    }
}

fn operation_prefix(op_index: &Option<usize>) -> String {
    op_index
        .map(|index| format!("operation {index}: "))
        .unwrap_or_default()
}

/// Destination for generated batches.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Apply a batch in order.
    async fn persist(&mut self, batch: &PersistBatch) -> Result<(), SinkError>;

    /// Remove every row of the listed tables and restart their sequences.
    async fn reset(&mut self, request: &ResetRequest) -> Result<(), SinkError>;
}

/// Read access to the state of the target store.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Identifier to the next value each sequence would hand out.
    async fn current_sequences(&self) -> Result<BTreeMap<String, i64>, SinkError>;

    /// Rows currently stored in `table`.
    async fn existing_rows(&self, _table: &Table) -> Result<Vec<BTreeMap<String, Value>>, SinkError> {
        Ok(Vec::new())
    }
}
