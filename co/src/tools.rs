//! LMS retrieval tool definitions
//!
//! Function-calling schemas describing the course retrievals, for callers
//! that let a model request course data itself.

use serde_json::json;
use tracing::debug;

use crate::course::ResourceKind;
use crate::llm::ToolDefinition;

/// Tool name for retrieving one kind of course resource
pub fn tool_name(kind: ResourceKind) -> String {
    format!("get_course_{}", kind.plural())
}

/// The four retrieval tools, one per resource kind
pub fn lms_tool_definitions() -> Vec<ToolDefinition> {
    debug!("lms_tool_definitions: called");
    ResourceKind::ALL
        .iter()
        .map(|kind| {
            ToolDefinition::new(
                tool_name(*kind),
                format!("Get all {} for a course", kind.plural()),
                json!({
                    "type": "object",
                    "properties": {
                        "course_id": {
                            "type": "integer",
                            "description": "The LMS course identifier"
                        }
                    },
                    "required": ["course_id"]
                }),
            )
        })
        .collect()
}
