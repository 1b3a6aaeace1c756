use seedsmith_core::SelectionError;
use seedsmith_plan::ValidationReport;
use thiserror::Error;

/// Errors emitted by the generation engine and the seed session.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid request: {0}")]
    InvalidRequest(ValidationReport),
    #[error("{0}")]
    UniquenessExhausted(Box<UniquenessViolation>),
    #[error("{0}")]
    Persistence(Box<PersistenceFailure>),
    #[error("state resync failed: {0}")]
    Resync(String),
    #[error("session state is stale after a failed sync or reset; call sync first")]
    ResyncRequired,
    #[error("core error: {0}")]
    Core(seedsmith_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<seedsmith_core::Error> for GenerationError {
    fn from(err: seedsmith_core::Error) -> Self {
        match err {
            seedsmith_core::Error::Selection(selection) => GenerationError::Selection(selection),
            other => GenerationError::Core(other),
        }
    }
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GenerationError>;

/// A row that could not be made unique within the retry budget.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "Unique constraint \"{constraint}\" violated for table \"{table}\" on fields ({}) with values ({})\nSeed: {seed_path}\nRow data: {row}",
    .fields.join(","),
    .values.join(",")
)]
pub struct UniquenessViolation {
    pub constraint: String,
    pub table: String,
    pub fields: Vec<String>,
    /// Rendered values of the constrained fields on the last attempt.
    pub values: Vec<String>,
    pub seed_path: String,
    pub attempts: u32,
    pub row: serde_json::Value,
}

/// A persistence sink rejected a batch.
///
/// When the sink names the failing operation, `table`, `ordinal` and `row`
/// carry that operation's target and values as they were sent.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "persistence failed{}: {message}{}",
    location(.op_index, .table),
    row_context(.ordinal, .row)
)]
pub struct PersistenceFailure {
    pub op_index: Option<usize>,
    pub table: Option<String>,
    /// Ordinal of the failing row within its table.
    pub ordinal: Option<usize>,
    pub row: Option<serde_json::Value>,
    pub message: String,
}

fn location(op_index: &Option<usize>, table: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(index) = op_index {
        out.push_str(&format!(" at operation {index}"));
    }
    if let Some(table) = table {
        out.push_str(&format!(" on table \"{table}\""));
    }
    out
}

fn row_context(ordinal: &Option<usize>, row: &Option<serde_json::Value>) -> String {
    let mut out = String::new();
    if let Some(ordinal) = ordinal {
        out.push_str(&format!("\nRow ordinal: {ordinal}"));
    }
    if let Some(row) = row {
        out.push_str(&format!("\nRow data: {row}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn persistence_failure_without_an_operation_is_just_the_message() {
        let failure = PersistenceFailure {
            op_index: None,
            table: None,
            ordinal: None,
            row: None,
            message: "reset rejected".to_string(),
        };
        assert_eq!(failure.to_string(), "persistence failed: reset rejected");
    }

    #[test]
    fn persistence_failure_renders_the_failing_row() {
        let failure = PersistenceFailure {
            op_index: Some(3),
            table: Some("public.posts".to_string()),
            ordinal: Some(2),
            row: Some(json!({ "id": 7, "title": "hello" })),
            message: "duplicate key".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "persistence failed at operation 3 on table \"public.posts\": duplicate key\n\
             Row ordinal: 2\n\
             Row data: {\"id\":7,\"title\":\"hello\"}"
        );
    }
}
