//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const ANALYSIS_SYSTEM: &str = include_str!("../../prompts/analysis-system.pmt");
pub const ANALYSIS_USER: &str = include_str!("../../prompts/analysis-user.pmt");
pub const PLANNING_SYSTEM: &str = include_str!("../../prompts/planning-system.pmt");
pub const PLANNING_USER: &str = include_str!("../../prompts/planning-user.pmt");
pub const ORGANIZATION_SYSTEM: &str = include_str!("../../prompts/organization-system.pmt");
pub const ORGANIZATION_USER: &str = include_str!("../../prompts/organization-user.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "analysis-system" => Some(ANALYSIS_SYSTEM),
        "analysis-user" => Some(ANALYSIS_USER),
        "planning-system" => Some(PLANNING_SYSTEM),
        "planning-user" => Some(PLANNING_USER),
        "organization-system" => Some(ORGANIZATION_SYSTEM),
        "organization-user" => Some(ORGANIZATION_USER),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
