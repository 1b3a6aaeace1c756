use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use jsonschema::JSONSchema;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PlanError, Result, ValidationIssue, ValidationReport};
use crate::model::Shape;

/// Session configuration loaded from `seedsmith.json` / `seedsmith.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeedConfig {
    /// Base seed every value seed is derived from.
    #[serde(default = "default_seed")]
    pub seed: String,
    /// Include/exclude table patterns (`!` prefix excludes).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    /// Advisory hints keyed by table id, then field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fingerprint: BTreeMap<String, BTreeMap<String, FieldHint>>,
    #[serde(default)]
    pub options: EngineOptions,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            select: Vec::new(),
            fingerprint: BTreeMap::new(),
            options: EngineOptions::default(),
        }
    }
}

/// Optional realism hint for one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
    /// Sample values to draw from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    /// Free-text description; a shape is guessed from it when `shape` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Number of items for JSON array fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<ItemCount>,
}

/// Fixed or ranged item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ItemCount {
    Exact(u32),
    Range { min: u32, max: u32 },
}

/// Field hints for a whole schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldHints {
    tables: BTreeMap<String, BTreeMap<String, FieldHint>>,
}

impl FieldHints {
    pub fn new(tables: BTreeMap<String, BTreeMap<String, FieldHint>>) -> Self {
        Self { tables }
    }

    pub fn get(&self, table: &str, field: &str) -> Option<&FieldHint> {
        self.tables.get(table).and_then(|fields| fields.get(field))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EngineOptions {
    /// Salted attempts per row before a uniqueness failure is reported.
    #[serde(default = "default_max_unique_retries")]
    pub max_unique_retries: u32,
    /// Connect unspecified relationships to existing rows by default.
    #[serde(default)]
    pub connect: bool,
    /// Render the batch without persisting it.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_unique_retries: default_max_unique_retries(),
            connect: false,
            dry_run: false,
        }
    }
}

fn default_seed() -> String {
    "seedsmith".to_string()
}

fn default_max_unique_retries() -> u32 {
    100
}

impl SeedConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a config file, choosing the format from its extension.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&raw),
            Some("json") => Self::from_json_str(&raw),
            other => Err(PlanError::Schema(format!(
                "unsupported config extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    pub fn hints(&self) -> FieldHints {
        FieldHints::new(self.fingerprint.clone())
    }
}

/// Emit the JSON Schema for the config file.
pub fn config_json_schema() -> RootSchema {
    schema_for!(SeedConfig)
}

/// Validate a config JSON document against the config JSON Schema.
pub fn validate_config_json(config_json: &Value) -> Result<ValidationReport> {
    let schema = serde_json::to_value(config_json_schema())?;
    let compiled = JSONSchema::compile(&schema).map_err(|err| PlanError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(config_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(ValidationIssue::error(
                "schema_violation",
                path,
                error.to_string(),
            ));
        }
    }

    Ok(report)
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_document() {
        let config = SeedConfig::from_json_str("{}").expect("parse config");
        assert_eq!(config, SeedConfig::default());
        assert_eq!(config.options.max_unique_retries, 100);
    }

    #[test]
    fn toml_and_json_agree() {
        let json = r#"{
            "seed": "demo",
            "select": ["!public._*"],
            "fingerprint": {"public.users": {"email": {"shape": "email"}}},
            "options": {"max_unique_retries": 5, "connect": true}
        }"#;
        let toml = r#"
            seed = "demo"
            select = ["!public._*"]

            [fingerprint."public.users".email]
            shape = "email"

            [options]
            max_unique_retries = 5
            connect = true
        "#;

        let from_json = SeedConfig::from_json_str(json).expect("json config");
        let from_toml = SeedConfig::from_toml_str(toml).expect("toml config");
        assert_eq!(from_json, from_toml);
        assert_eq!(
            from_json.hints().get("public.users", "email").and_then(|hint| hint.shape),
            Some(Shape::Email)
        );
    }

    #[test]
    fn schema_rejects_wrong_types() {
        let report = validate_config_json(&serde_json::json!({
            "select": "public.users",
            "options": {"max_unique_retries": -1}
        }))
        .expect("validate");
        assert!(!report.is_ok());
        assert!(report.errors.iter().all(|issue| issue.code == "schema_violation"));
    }
}
