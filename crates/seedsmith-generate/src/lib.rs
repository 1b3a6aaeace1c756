//! Seed engine: deterministic, constraint-aware row generation.
//!
//! A [`SeedClient`] owns one session over a filtered schema. Each request is
//! planned into an ordered [`PersistBatch`] (parents before children,
//! deferred references as trailing updates) and optionally handed to a
//! [`PersistenceSink`]. Values are derived from stable seed paths, so the
//! same schema, configuration and request sequence always yield the same
//! batches.

pub mod adapter;
pub mod client;
pub mod engine;
pub mod errors;
pub mod generators;
pub mod logging;
pub mod model;
pub mod sequences;
pub mod sinks;
pub mod store;
pub mod value;

pub use adapter::{PersistBatch, PersistOp, PersistenceSink, ResetRequest, SinkError, StateSource};
pub use client::SeedClient;
pub use engine::Planner;
pub use errors::{GenerationError, PersistenceFailure, Result, UniquenessViolation};
pub use generators::{FieldInput, Seed, generate, infer_shape};
pub use logging::{LogFormat, init_logging};
pub use model::{PlanReport, SeedOutcome, TableReport};
pub use sequences::{SequenceSnapshot, SequenceTracker};
pub use sinks::{CsvSink, MemorySink};
pub use store::{GeneratedRow, KeyConflict, RowStore};
pub use value::{GeneratedValue, RowValues};
