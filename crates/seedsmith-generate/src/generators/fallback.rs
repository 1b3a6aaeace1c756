use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::{Rng, RngCore};
use rand_chacha::ChaCha8Rng;
use seedsmith_core::{Field, TypeFamily};
use serde_json::{Map, Value};

use super::shapes::random_uuid;
use crate::value::GeneratedValue;

const INTEGER_MAX: i64 = 100_000;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

/// Value derived only from the declared type of a field.
pub fn scalar(field: &Field, rng: &mut ChaCha8Rng) -> GeneratedValue {
    match field.field_type.family() {
        TypeFamily::Uuid => GeneratedValue::Uuid(random_uuid(rng)),
        TypeFamily::Integer => {
            let max = field
                .field_type
                .integer_range()
                .map_or(INTEGER_MAX, |(_, max)| max.min(INTEGER_MAX));
            GeneratedValue::Int(rng.random_range(1..=max))
        }
        TypeFamily::Float => GeneratedValue::Float(rng.random_range(0.0..=100000.0)),
        TypeFamily::Decimal => {
            let cents: i64 = rng.random_range(0..=10_000_000);
            GeneratedValue::Float(cents as f64 / 100.0)
        }
        TypeFamily::Bool => GeneratedValue::Bool(rng.random_bool(0.5)),
        TypeFamily::Date => {
            let offset = rng.random_range(0..=365);
            GeneratedValue::Date(base_date() + Duration::days(offset))
        }
        TypeFamily::Timestamp => {
            let offset = rng.random_range(0..=365);
            let date = base_date() + Duration::days(offset);
            GeneratedValue::Timestamp(NaiveDateTime::new(date, time_of_day(rng)))
        }
        TypeFamily::Time => GeneratedValue::Time(time_of_day(rng)),
        TypeFamily::Json => {
            let mut object = Map::new();
            object.insert(
                "value".to_string(),
                Value::from(format!("{}_{}", field.name, rng.random::<u32>())),
            );
            GeneratedValue::Json(Value::Object(object))
        }
        TypeFamily::Bytes => {
            let mut bytes = [0_u8; 8];
            rng.fill_bytes(&mut bytes);
            GeneratedValue::Text(format!("\\x{}", hex::encode(bytes)))
        }
        TypeFamily::Text | TypeFamily::Enum | TypeFamily::Other => {
            GeneratedValue::Text(format!("{}_{}", field.name, rng.random::<u32>()))
        }
    }
}

fn time_of_day(rng: &mut ChaCha8Rng) -> NaiveTime {
    let seconds = rng.random_range(0..=86399);
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use seedsmith_core::FieldType;

    #[test]
    fn follows_type_family() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let int = scalar(&Field::new("count", FieldType::new("bigint")), &mut rng);
        assert!(int.as_i64().is_some_and(|value| (1..=100000).contains(&value)));

        for _ in 0..200 {
            let small = scalar(&Field::new("qty", FieldType::new("int2")), &mut rng);
            assert!(small.as_i64().is_some_and(|value| (1..=32767).contains(&value)));
            let tiny = scalar(&Field::new("rank", FieldType::new("tinyint")), &mut rng);
            assert!(tiny.as_i64().is_some_and(|value| (1..=127).contains(&value)));
        }

        let flag = scalar(&Field::new("active", FieldType::new("boolean")), &mut rng);
        assert!(matches!(flag, GeneratedValue::Bool(_)));

        let stamp = scalar(
            &Field::new("created_at", FieldType::new("timestamptz")),
            &mut rng,
        );
        assert!(matches!(stamp, GeneratedValue::Timestamp(_)));

        let text = scalar(&Field::new("code", FieldType::new("text")), &mut rng);
        assert!(text.as_str().is_some_and(|value| value.starts_with("code_")));
    }
}
