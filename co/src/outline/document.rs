//! The final outline document

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::PipelineError;

/// Parsed final outline
///
/// The model chooses the exact shape; only the top-level sections are
/// looked up, and section names are matched loosely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outline(Map<String, Value>);

impl Outline {
    /// Parse the Organization stage text
    ///
    /// A surrounding markdown code fence is tolerated. Anything other than a
    /// JSON object (including arrays and scalars) is malformed.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        debug!(len = text.len(), "Outline::parse: called");
        let body = strip_code_fence(text);
        let malformed = |reason: String| PipelineError::MalformedOutput {
            reason,
            raw: text.to_string(),
        };

        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(malformed(format!("expected a JSON object, got {}", kind_of(&other)))),
            Err(e) => Err(malformed(e.to_string())),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Look up a top-level section by name, ignoring case and separators
    pub fn section(&self, name: &str) -> Option<&Value> {
        let wanted = fold_key(name);
        self.0.iter().find(|(k, _)| fold_key(k) == wanted).map(|(_, v)| v)
    }

    pub fn course_information(&self) -> Option<&Value> {
        self.section("course_information")
    }

    pub fn content_organization(&self) -> Option<&Value> {
        self.section("content_organization")
    }

    pub fn resources(&self) -> Option<&Value> {
        self.section("resources")
    }

    pub fn dates(&self) -> Option<&Value> {
        self.section("dates")
    }

    pub fn relationships(&self) -> Option<&Value> {
        self.section("relationships")
    }

    /// Every top-level section except resources
    pub fn structure_sections(&self) -> impl Iterator<Item = &Value> {
        let resources = fold_key("resources");
        self.0
            .iter()
            .filter(move |(k, _)| fold_key(k) != resources)
            .map(|(_, v)| v)
    }

    /// Number of entries in the resources section
    ///
    /// Counts array elements, or the elements of every array nested one level
    /// down when resources are grouped (e.g. by type).
    pub fn resource_count(&self) -> usize {
        match self.resources() {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(groups)) => groups.values().filter_map(Value::as_array).map(Vec::len).sum(),
            _ => 0,
        }
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Strip a ```json ... ``` fence wrapping the whole text
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json"), which may be glued to the body
    body.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .trim()
}
