use std::fmt;

use sea_orm::{JsonValue, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::StoreError;

/// One record: column name to value, in result-column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: Map<String, JsonValue>,
}

impl Row {
    pub fn new(fields: Map<String, JsonValue>) -> Self {
        Self { fields }
    }

    /// Decode a query result row into column/value pairs.
    ///
    /// Values are read by their stored type rather than the declared column type, so
    /// `DECIMAL` columns, expressions and literals keep their values.
    pub fn from_query_result(result: &QueryResult) -> Result<Self, StoreError> {
        let mut fields = Map::new();
        for column in result.column_names() {
            let value = decode_value(result, &column)?;
            fields.insert(column, value);
        }
        Ok(Self { fields })
    }

    /// Interpret a JSON value as a record; only objects qualify.
    pub fn from_json(value: JsonValue) -> Result<Self, StoreError> {
        match value {
            JsonValue::Object(fields) => Ok(Self { fields }),
            other => Err(StoreError::decode(format!(
                "expected a JSON object record, got: {other}"
            ))),
        }
    }

    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.fields.get(column)
    }

    /// Numeric view of a column. Numbers and numeric strings qualify; `None` when the
    /// column is missing or null.
    pub fn get_f64(&self, column: &str) -> Result<Option<f64>, StoreError> {
        match self.fields.get(column) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::Number(n)) => n.as_f64().map(Some).ok_or_else(|| {
                StoreError::decode(format!("column '{column}' is not representable as f64"))
            }),
            Some(JsonValue::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                StoreError::decode(format!("column '{column}' is not numeric: '{s}'"))
            }),
            Some(other) => Err(StoreError::decode(format!(
                "column '{column}' is not numeric: {other}"
            ))),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

}

/// Integer, then real, then text, then blob; SQL NULL decodes as JSON null.
fn decode_value(result: &QueryResult, column: &str) -> Result<JsonValue, StoreError> {
    if let Ok(v) = result.try_get::<Option<i64>>("", column) {
        return Ok(v.map_or(JsonValue::Null, JsonValue::from));
    }
    if let Ok(v) = result.try_get::<Option<f64>>("", column) {
        return Ok(v.map_or(JsonValue::Null, JsonValue::from));
    }
    if let Ok(v) = result.try_get::<Option<String>>("", column) {
        return Ok(v.map_or(JsonValue::Null, JsonValue::from));
    }
    if let Ok(v) = result.try_get::<Option<Vec<u8>>>("", column) {
        return Ok(v.map_or(JsonValue::Null, JsonValue::from));
    }
    Err(StoreError::decode(format!(
        "column '{column}' holds a value of unsupported type"
    )))
}

impl From<Map<String, JsonValue>> for Row {
    fn from(fields: Map<String, JsonValue>) -> Self {
        Self::new(fields)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.fields).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: JsonValue) -> Row {
        Row::from_json(value).unwrap()
    }

    #[test]
    fn get_f64_handles_numbers_strings_and_missing() {
        let r = row(json!({"age": 31, "score": "12.5", "nick": null}));
        assert_eq!(r.get_f64("age").unwrap(), Some(31.0));
        assert_eq!(r.get_f64("score").unwrap(), Some(12.5));
        assert_eq!(r.get_f64("nick").unwrap(), None);
        assert_eq!(r.get_f64("missing").unwrap(), None);
    }

    #[test]
    fn get_f64_rejects_non_numeric() {
        let r = row(json!({"age": "old", "flags": [1, 2]}));
        assert!(matches!(r.get_f64("age"), Err(StoreError::Decode { .. })));
        assert!(matches!(r.get_f64("flags"), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(Row::from_json(json!([1, 2, 3])).is_err());
        assert!(Row::from_json(json!("user")).is_err());
    }

    #[test]
    fn serializes_as_plain_object() {
        let r = row(json!({"name": "Ada", "age": 36}));
        let text = serde_json::to_string(&r).unwrap();
        let back: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, json!({"name": "Ada", "age": 36}));
        assert_eq!(r.len(), 2);
        assert!(r.columns().any(|c| c == "name"));
    }
}
