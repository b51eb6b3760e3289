use crate::schema::{FieldType, Model};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// The wire format for `datetime` column values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A dynamically typed SQL value.
///
/// Rows cross the repository boundary as maps of these, so one value type has
/// to cover every column type a model can declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(JsonValue),
    DateTime(DateTime<Utc>),
}

/// One database row: column name to value.
pub type Row = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Normalizes a value for a write path, using the column's **declared** type —
/// never the runtime shape of the value.
///
/// - `datetime` columns: timestamps become `"YYYY-MM-DD HH:MM:SS"` text.
/// - `json` columns: any non-null value becomes its textual JSON form, so a
///   plain string still gets JSON-encoded (quoted).
/// - `Null` passes through as SQL NULL; everything else passes unmodified.
pub fn normalize(field_type: FieldType, value: Value) -> Value {
    match (field_type, value) {
        (_, Value::Null) => Value::Null,
        (FieldType::DateTime, Value::DateTime(ts)) => {
            Value::Text(ts.format(DATETIME_FORMAT).to_string())
        }
        (FieldType::DateTime, other) => other,
        (FieldType::Json, value) => Value::Text(to_json(value).to_string()),
        (_, other) => other,
    }
}

/// Lifts any `Value` into a JSON document for storage in a `json` column.
fn to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(b),
        Value::Int(i) => JsonValue::from(i),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s),
        Value::Json(j) => j,
        Value::DateTime(ts) => JsonValue::String(ts.format(DATETIME_FORMAT).to_string()),
    }
}

/// Maps raw column values fetched from the database back into their
/// model-declared shapes: `json` text is parsed into `Value::Json`, `datetime`
/// text into `Value::DateTime`, and integer-backed booleans into `Value::Bool`.
/// Columns the model does not declare (e.g. aggregates) pass through untouched.
pub(crate) fn refine_row(model: &Model, row: Row) -> Row {
    row.into_iter()
        .map(|(name, value)| {
            let refined = match model.field(&name).map(|f| f.field_type) {
                Some(FieldType::Json) => match value {
                    Value::Text(text) => serde_json::from_str(&text)
                        .map(Value::Json)
                        .unwrap_or(Value::Text(text)),
                    other => other,
                },
                Some(FieldType::DateTime) => match value {
                    Value::Text(text) => NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT)
                        .map(|naive| Value::DateTime(naive.and_utc()))
                        .unwrap_or(Value::Text(text)),
                    other => other,
                },
                Some(FieldType::Boolean) => match value {
                    Value::Int(i) => Value::Bool(i != 0),
                    other => other,
                },
                _ => value,
            };
            (name, refined)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetime_values_serialize_to_second_precision_text() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        assert_eq!(
            normalize(FieldType::DateTime, Value::DateTime(ts)),
            Value::Text("2024-03-09 14:30:05".to_string())
        );
    }

    #[test]
    fn json_columns_encode_by_declared_type_not_value_shape() {
        // A plain string in a json column still gets JSON-encoded (quoted).
        assert_eq!(
            normalize(FieldType::Json, Value::Text("hello".to_string())),
            Value::Text("\"hello\"".to_string())
        );
        assert_eq!(
            normalize(FieldType::Json, Value::Json(serde_json::json!({"a": 1}))),
            Value::Text("{\"a\":1}".to_string())
        );
        assert_eq!(
            normalize(FieldType::Json, Value::Int(7)),
            Value::Text("7".to_string())
        );
    }

    #[test]
    fn null_passes_through_every_declared_type() {
        for field_type in [
            FieldType::String,
            FieldType::Int,
            FieldType::Float,
            FieldType::Boolean,
            FieldType::Json,
            FieldType::DateTime,
        ] {
            assert_eq!(normalize(field_type, Value::Null), Value::Null);
        }
    }

    #[test]
    fn scalar_values_pass_through_unmodified() {
        assert_eq!(
            normalize(FieldType::Int, Value::Int(42)),
            Value::Int(42)
        );
        assert_eq!(
            normalize(FieldType::String, Value::Text("x".into())),
            Value::Text("x".into())
        );
    }
}
