//! Opaque LMS records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// One LMS-defined record (module, assignment, quiz, file)
///
/// The pipeline never interprets record fields beyond the stable `id`; the
/// whole record is passed through to the prompts in field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseRecord(Map<String, Value>);

impl CourseRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Stable identifier, normalized to text
    pub fn id(&self) -> Option<String> {
        self.0.get("id").and_then(normalize_id)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for CourseRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Normalize an identifier value: numbers and non-empty strings only
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Convert raw LMS values into records
///
/// The LMS returns objects; anything else is kept (wrapped under `value`)
/// rather than dropped.
pub fn records_from_values(values: Vec<Value>) -> Vec<CourseRecord> {
    values
        .into_iter()
        .map(|value| match value {
            Value::Object(map) => CourseRecord(map),
            other => {
                warn!(value = %other, "records_from_values: non-object record wrapped");
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                CourseRecord(map)
            }
        })
        .collect()
}

/// Serialize a collection the way it is embedded in prompts
pub fn records_to_text(records: &[CourseRecord]) -> String {
    Value::Array(records.iter().cloned().map(CourseRecord::into_value).collect()).to_string()
}
