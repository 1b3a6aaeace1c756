//! Deterministic field value generation.
//!
//! Every value is a pure function of its [`Seed`] and the rule in effect for
//! the field. The generator never looks at other rows; uniqueness is enforced
//! by the planner, which re-invokes it with a salted seed.

mod fallback;
mod shapes;

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_regex::Regex as RandRegex;
use seedsmith_core::{Field, SchemaGraph, Table, TypeFamily};
use seedsmith_plan::{FieldContext, FieldHint, FieldRule, ItemCount, Shape, Template};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{GenerationError, Result};
use crate::value::{GeneratedValue, RowValues, row_to_json};

pub use shapes::infer_shape;

const PATTERN_MAX_REPEAT: u32 = 16;

/// Seed derived from a stable textual path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    path: String,
    digest: [u8; 32],
}

impl Seed {
    pub fn derive(path: impl Into<String>) -> Self {
        let path = path.into();
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        Self {
            digest: hasher.finalize().into(),
            path,
        }
    }

    /// Seed for retry `attempt`; attempt 0 is the seed itself.
    pub fn salted(&self, attempt: u32) -> Self {
        if attempt == 0 {
            return self.clone();
        }
        Self::derive(format!("{}#{attempt}", self.path))
    }

    /// Child seed for a sub-path.
    pub fn child(&self, segment: &str) -> Self {
        Self::derive(format!("{}/{segment}", self.path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn as_u64(&self) -> u64 {
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(&self.digest[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::from_seed(self.digest)
    }
}

/// Everything the generator may read about the field being generated.
#[derive(Debug, Clone, Copy)]
pub struct FieldInput<'a> {
    pub schema: &'a SchemaGraph,
    pub table: &'a Table,
    pub field: &'a Field,
    pub hint: Option<&'a FieldHint>,
    /// Values already assigned to the row.
    pub row: &'a RowValues,
}

/// Produce a value for one field.
pub fn generate(seed: &Seed, rule: Option<&FieldRule>, input: &FieldInput<'_>) -> Result<GeneratedValue> {
    let field_type = &input.field.field_type;
    let mut rng = seed.rng();

    let value = match rule {
        Some(FieldRule::Constant(value)) => GeneratedValue::from_json(value, field_type)?,
        Some(FieldRule::Callback(callback)) => {
            let table_id = input.table.id();
            let row = row_to_json(input.row);
            let ctx = FieldContext {
                table: &table_id,
                field: &input.field.name,
                seed_path: seed.path(),
                seed: seed.as_u64(),
                row: &row,
            };
            let value = callback.call(&ctx).map_err(|message| {
                GenerationError::Configuration(format!(
                    "callback for {}.{} failed: {message}",
                    table_id, input.field.name
                ))
            })?;
            GeneratedValue::from_json(&value, field_type)?
        }
        Some(FieldRule::OneOf(values)) => {
            let value = values.choose(&mut rng).ok_or_else(|| {
                GenerationError::Configuration(format!(
                    "one_of for {}.{} has no values",
                    input.table.id(),
                    input.field.name
                ))
            })?;
            GeneratedValue::from_json(value, field_type)?
        }
        Some(FieldRule::Template(template)) => render_template(template, input, &mut rng)?,
        None => render_template(&Template::Auto, input, &mut rng)?,
    };

    Ok(truncate(value, field_type.max_length))
}

fn render_template(
    template: &Template,
    input: &FieldInput<'_>,
    rng: &mut ChaCha8Rng,
) -> Result<GeneratedValue> {
    match template {
        Template::Shape(_) if input.field.field_type.family() == TypeFamily::Enum => {
            pick_enum_label(input, rng)
        }
        Template::Shape(shape) => render_shape(*shape, input, rng, true),
        Template::Pattern(pattern) => {
            let regex = RandRegex::compile(pattern, PATTERN_MAX_REPEAT).map_err(|err| {
                GenerationError::Configuration(format!(
                    "invalid pattern for {}.{}: {err}",
                    input.table.id(),
                    input.field.name
                ))
            })?;
            let value: String = rng.sample(regex);
            GeneratedValue::from_json(&Value::String(value), &input.field.field_type)
        }
        Template::Auto => render_auto(input, rng),
    }
}

fn render_auto(input: &FieldInput<'_>, rng: &mut ChaCha8Rng) -> Result<GeneratedValue> {
    let field_type = &input.field.field_type;
    let family = field_type.family();

    if family == TypeFamily::Enum {
        return pick_enum_label(input, rng);
    }

    if let Some(hint) = input.hint {
        if field_type.is_list || family == TypeFamily::Json {
            return Ok(json_from_hint(hint, input, rng));
        }
        if let Some(example) = hint.examples.choose(rng)
            && let Ok(value) = GeneratedValue::from_json(example, field_type)
        {
            return Ok(value);
        }
        if let Some(shape) = hint
            .shape
            .or_else(|| hint.description.as_deref().and_then(infer_shape))
        {
            return render_shape(shape, input, rng, false);
        }
    }

    if field_type.is_list {
        let count = rng.random_range(1..=3);
        let items = (0..count)
            .map(|_| fallback::scalar(input.field, rng).to_json())
            .collect();
        return Ok(GeneratedValue::Json(Value::Array(items)));
    }

    if let Some(shape) = infer_shape(&input.field.name) {
        return render_shape(shape, input, rng, false);
    }

    Ok(fallback::scalar(input.field, rng))
}

fn render_shape(
    shape: Shape,
    input: &FieldInput<'_>,
    rng: &mut ChaCha8Rng,
    explicit: bool,
) -> Result<GeneratedValue> {
    let raw = shapes::render(shape, rng);
    match GeneratedValue::from_json(&raw, &input.field.field_type) {
        Ok(value) => Ok(value),
        Err(err) if explicit => Err(GenerationError::Configuration(format!(
            "shape '{}' cannot fill {}.{}: {err}",
            shape.as_str(),
            input.table.id(),
            input.field.name
        ))),
        Err(_) => Ok(fallback::scalar(input.field, rng)),
    }
}

fn pick_enum_label(input: &FieldInput<'_>, rng: &mut ChaCha8Rng) -> Result<GeneratedValue> {
    let enum_ref = input.field.field_type.enum_ref.as_deref().unwrap_or_default();
    let label = input
        .schema
        .enum_type(enum_ref)
        .and_then(|enum_type| enum_type.labels.choose(rng))
        .ok_or_else(|| {
            GenerationError::Configuration(format!(
                "enum '{enum_ref}' for {}.{} has no labels",
                input.table.id(),
                input.field.name
            ))
        })?;
    Ok(GeneratedValue::Text(label.clone()))
}

fn json_from_hint(hint: &FieldHint, input: &FieldInput<'_>, rng: &mut ChaCha8Rng) -> GeneratedValue {
    let pick = |rng: &mut ChaCha8Rng| -> Value {
        match hint.examples.choose(rng) {
            Some(example) => example.clone(),
            None => match hint.shape {
                Some(shape) => shapes::render(shape, rng),
                None => fallback::scalar(input.field, rng).to_json(),
            },
        }
    };

    let wants_array = input.field.field_type.is_list || hint.item_count.is_some();
    if !wants_array {
        return GeneratedValue::Json(pick(rng));
    }

    let count = match hint.item_count {
        Some(ItemCount::Exact(count)) => count,
        Some(ItemCount::Range { min, max }) => rng.random_range(min..=max.max(min)),
        None => rng.random_range(1..=3),
    };
    let items = (0..count).map(|_| pick(rng)).collect();
    GeneratedValue::Json(Value::Array(items))
}

fn truncate(value: GeneratedValue, max_length: Option<u32>) -> GeneratedValue {
    match (value, max_length) {
        (GeneratedValue::Text(text), Some(max)) if text.chars().count() > max as usize => {
            GeneratedValue::Text(text.chars().take(max as usize).collect())
        }
        (value, _) => value,
    }
}
