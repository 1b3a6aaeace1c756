use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use seedsmith_core::{FieldType, TypeFamily};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::errors::{GenerationError, Result};

/// Generated value for a field.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Json(Value),
}

/// Field name to value, ordered by field name.
pub type RowValues = BTreeMap<String, GeneratedValue>;

impl GeneratedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GeneratedValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneratedValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Canonical text used in uniqueness indices.
    pub fn key(&self) -> String {
        match self {
            GeneratedValue::Null => "<null>".to_string(),
            GeneratedValue::Bool(value) => value.to_string(),
            GeneratedValue::Int(value) => value.to_string(),
            GeneratedValue::Float(value) => value.to_string(),
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => value.clone(),
            GeneratedValue::Date(value) => value.format("%Y-%m-%d").to_string(),
            GeneratedValue::Time(value) => value.format("%H:%M:%S").to_string(),
            GeneratedValue::Timestamp(value) => value.format("%Y-%m-%dT%H:%M:%S").to_string(),
            GeneratedValue::Json(value) => value.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            GeneratedValue::Null => Value::Null,
            GeneratedValue::Bool(value) => Value::Bool(*value),
            GeneratedValue::Int(value) => Value::from(*value),
            GeneratedValue::Float(value) => Value::from(*value),
            GeneratedValue::Json(value) => value.clone(),
            other => Value::String(other.key()),
        }
    }

    /// Plain text for CSV cells; NULL is the empty string.
    pub fn to_csv(&self) -> String {
        match self {
            GeneratedValue::Null => String::new(),
            other => other.key(),
        }
    }

    /// SQL literal used when rendering statements.
    pub fn to_sql_literal(&self) -> String {
        match self {
            GeneratedValue::Null => "NULL".to_string(),
            GeneratedValue::Bool(value) => value.to_string(),
            GeneratedValue::Int(value) => value.to_string(),
            GeneratedValue::Float(value) => value.to_string(),
            other => format!("'{}'", other.key().replace('\'', "''")),
        }
    }

    /// Convert a JSON value into the representation of `field_type`.
    pub fn from_json(value: &Value, field_type: &FieldType) -> Result<Self> {
        if value.is_null() {
            return Ok(GeneratedValue::Null);
        }

        if field_type.is_list {
            return match value {
                Value::Array(_) => Ok(GeneratedValue::Json(value.clone())),
                other => Ok(GeneratedValue::Json(Value::Array(vec![other.clone()]))),
            };
        }

        let mismatch = || {
            GenerationError::Configuration(format!(
                "value {value} does not fit type '{}'",
                field_type.data_type
            ))
        };

        let converted = match field_type.family() {
            TypeFamily::Integer => match value {
                Value::Number(number) => number.as_i64().map(GeneratedValue::Int),
                Value::String(text) => text.trim().parse().ok().map(GeneratedValue::Int),
                _ => None,
            },
            TypeFamily::Float | TypeFamily::Decimal => match value {
                Value::Number(number) => number.as_f64().map(GeneratedValue::Float),
                Value::String(text) => text.trim().parse().ok().map(GeneratedValue::Float),
                _ => None,
            },
            TypeFamily::Bool => match value {
                Value::Bool(flag) => Some(GeneratedValue::Bool(*flag)),
                Value::String(text) => text.parse().ok().map(GeneratedValue::Bool),
                _ => None,
            },
            TypeFamily::Uuid => value
                .as_str()
                .and_then(|text| uuid::Uuid::parse_str(text).ok())
                .map(|id| GeneratedValue::Uuid(id.to_string())),
            TypeFamily::Date => value
                .as_str()
                .and_then(|text| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok())
                .map(GeneratedValue::Date),
            TypeFamily::Time => value
                .as_str()
                .and_then(|text| NaiveTime::parse_from_str(text, "%H:%M:%S").ok())
                .map(GeneratedValue::Time),
            TypeFamily::Timestamp => value.as_str().and_then(parse_timestamp),
            TypeFamily::Json => Some(GeneratedValue::Json(value.clone())),
            TypeFamily::Text | TypeFamily::Enum | TypeFamily::Bytes | TypeFamily::Other => {
                Some(GeneratedValue::Text(match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                }))
            }
        };

        converted.ok_or_else(mismatch)
    }
}

fn parse_timestamp(text: &str) -> Option<GeneratedValue> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|value| value.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(GeneratedValue::Timestamp)
}

impl fmt::Display for GeneratedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratedValue::Null => f.write_str("null"),
            other => f.write_str(&other.key()),
        }
    }
}

impl Serialize for GeneratedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// JSON view of a row, as handed to callbacks and error reports.
pub fn row_to_json(values: &RowValues) -> BTreeMap<String, Value> {
    values
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}
