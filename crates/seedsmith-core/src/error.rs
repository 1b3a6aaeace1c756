use thiserror::Error;

use crate::select::SelectionError;

/// Core error type shared across seedsmith crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema graph violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A select rule could not be compiled.
    #[error("invalid select pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    /// Include/exclude rules leave a required relationship without its parent.
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// Tables joined by a cycle of non-nullable relationships.
    #[error("unsatisfiable relationship cycle between tables: {}", .0.join(", "))]
    UnsatisfiableCycle(Vec<String>),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by seedsmith crates.
pub type Result<T> = std::result::Result<T, Error>;
