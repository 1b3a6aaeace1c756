//! Core contracts for seedsmith.
//!
//! This crate defines the schema graph consumed by the generation engine,
//! its validation, dependency analysis and the include/exclude table
//! selection shared by generation and reset.

pub mod constraints;
pub mod error;
pub mod graph;
pub mod schema;
pub mod select;
pub mod types;
pub mod validation;

pub use constraints::{PrimaryKey, Relationship, UniqueConstraint};
pub use error::{Error, Result};
pub use graph::{DependencyReport, GraphSummary, analyze_dependencies};
pub use schema::{Field, SchemaGraph, Table};
pub use select::{
    Polarity, SelectRule, Selection, SelectionError, compute_included_tables, filter_schema,
};
pub use types::{EnumType, FieldType, Sequence, TypeFamily};
pub use validation::validate_schema;

/// Current contract version for schema graph snapshots.
pub const SCHEMA_VERSION: &str = "0.1";
