use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declared column type as reported by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldType {
    /// User-friendly formatted type (e.g. `character varying(255)`, `int4`).
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Array column (`text[]`, `int4[]`).
    #[serde(default)]
    pub is_list: bool,
    /// Qualified enum id (`schema.name`) for enum-typed columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_ref: Option<String>,
}

impl FieldType {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            max_length: None,
            is_list: false,
            enum_ref: None,
        }
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_enum(mut self, enum_ref: impl Into<String>) -> Self {
        self.enum_ref = Some(enum_ref.into());
        self
    }

    /// Type family used to pick a fallback template.
    pub fn family(&self) -> TypeFamily {
        if self.enum_ref.is_some() {
            return TypeFamily::Enum;
        }

        match normalize_type(&self.data_type).as_str() {
            "smallint" | "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "serial"
            | "serial4" | "serial8" | "bigserial" | "smallserial" | "tinyint" | "mediumint" => {
                TypeFamily::Integer
            }
            "real" | "float" | "float4" | "float8" | "double" | "double precision" => {
                TypeFamily::Float
            }
            "numeric" | "decimal" | "money" => TypeFamily::Decimal,
            "boolean" | "bool" => TypeFamily::Bool,
            "uuid" => TypeFamily::Uuid,
            "date" => TypeFamily::Date,
            "time" | "timetz" | "time without time zone" | "time with time zone" => {
                TypeFamily::Time
            }
            "timestamp"
            | "timestamptz"
            | "datetime"
            | "timestamp without time zone"
            | "timestamp with time zone" => TypeFamily::Timestamp,
            "json" | "jsonb" => TypeFamily::Json,
            "bytea" | "blob" | "binary" | "varbinary" => TypeFamily::Bytes,
            "text" | "varchar" | "character varying" | "character" | "char" | "bpchar"
            | "citext" | "name" | "string" => TypeFamily::Text,
            _ => TypeFamily::Other,
        }
    }
}

impl FieldType {
    /// Inclusive range a column of an integer type can store.
    ///
    /// `None` for non-integer types. Unrecognised integer spellings get the
    /// 32-bit range.
    pub fn integer_range(&self) -> Option<(i64, i64)> {
        if self.family() != TypeFamily::Integer {
            return None;
        }
        let range = match normalize_type(&self.data_type).as_str() {
            "tinyint" => (i64::from(i8::MIN), i64::from(i8::MAX)),
            "smallint" | "int2" | "smallserial" => (i64::from(i16::MIN), i64::from(i16::MAX)),
            "mediumint" => (-8_388_608, 8_388_607),
            "int8" | "bigint" | "serial8" | "bigserial" => (i64::MIN, i64::MAX),
            _ => (i64::from(i32::MIN), i64::from(i32::MAX)),
        };
        Some(range)
    }
}

/// Coarse category of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Integer,
    Float,
    Decimal,
    Bool,
    Text,
    Uuid,
    Date,
    Time,
    Timestamp,
    Json,
    Bytes,
    Enum,
    Other,
}

/// Auto-increment generator backing a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Sequence {
    pub identifier: String,
    #[serde(default = "default_increment")]
    pub increment: i64,
    /// Next value the sequence will hand out.
    pub current: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
}

impl Sequence {
    pub fn new(identifier: impl Into<String>, current: i64) -> Self {
        Self {
            identifier: identifier.into(),
            increment: 1,
            current,
            start: None,
        }
    }

    /// Value the sequence rewinds to on a destructive reset.
    pub fn restart_value(&self) -> i64 {
        self.start.unwrap_or(1)
    }
}

fn default_increment() -> i64 {
    1
}

/// Database enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnumType {
    pub schema: String,
    pub name: String,
    pub labels: Vec<String>,
}

impl EnumType {
    pub fn id(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

fn normalize_type(data_type: &str) -> String {
    let lowered = data_type.trim().to_lowercase();
    let without_array = lowered.trim_end_matches("[]");
    let base = match without_array.split_once('(') {
        Some((head, rest)) => {
            let tail = rest.split_once(')').map(|(_, tail)| tail).unwrap_or("");
            format!("{}{}", head.trim_end(), tail)
        }
        None => without_array.to_string(),
    };
    base.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_strips_modifiers() {
        assert_eq!(
            FieldType::new("character varying(255)").family(),
            TypeFamily::Text
        );
        assert_eq!(FieldType::new("numeric(10,2)").family(), TypeFamily::Decimal);
        assert_eq!(
            FieldType::new("timestamp(3) with time zone").family(),
            TypeFamily::Timestamp
        );
        assert_eq!(FieldType::new("INT4").family(), TypeFamily::Integer);
        assert_eq!(FieldType::new("text[]").family(), TypeFamily::Text);
    }

    #[test]
    fn enum_ref_wins_over_data_type() {
        let field_type = FieldType::new("text").with_enum("public.mood");
        assert_eq!(field_type.family(), TypeFamily::Enum);
    }

    #[test]
    fn integer_range_follows_width() {
        assert_eq!(FieldType::new("int2").integer_range(), Some((-32768, 32767)));
        assert_eq!(FieldType::new("TINYINT").integer_range(), Some((-128, 127)));
        assert_eq!(
            FieldType::new("integer").integer_range(),
            Some((-2_147_483_648, 2_147_483_647))
        );
        assert_eq!(FieldType::new("bigint").integer_range().map(|r| r.1), Some(i64::MAX));
        assert_eq!(FieldType::new("text").integer_range(), None);
    }

    #[test]
    fn unknown_types_fall_back_to_other() {
        assert_eq!(FieldType::new("tsvector").family(), TypeFamily::Other);
    }
}
