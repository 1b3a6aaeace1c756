use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::TableRequest;

/// Emit the JSON Schema for request documents.
pub fn request_json_schema() -> RootSchema {
    schema_for!(TableRequest)
}
