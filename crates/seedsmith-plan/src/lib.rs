//! Request contracts, request validation and session configuration.

pub mod config;
pub mod errors;
pub mod model;
pub mod schema;
pub mod validate;

pub use config::{
    EngineOptions, FieldHint, FieldHints, ItemCount, SeedConfig, config_json_schema,
    validate_config_json,
};
pub use errors::{IssueSeverity, PlanError, Result, ValidationIssue, ValidationReport};
pub use model::{
    Count, FieldCallback, FieldContext, FieldRule, ParentRequest, Shape, TableRequest, Template,
};
pub use schema::request_json_schema;
pub use validate::validate_request;
