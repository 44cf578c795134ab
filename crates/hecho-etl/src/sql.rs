//! Conversions from optional domain values to SQL parameters.

use hecho_store_sqlite::Value;

pub fn text(value: Option<&str>) -> Value {
  value.map_or(Value::Null, |s| Value::Text(s.to_owned()))
}

pub fn int(value: Option<i64>) -> Value { value.map_or(Value::Null, Value::Integer) }

pub fn real(value: Option<f64>) -> Value { value.map_or(Value::Null, Value::Real) }
