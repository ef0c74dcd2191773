//! Prompt Template System
//!
//! Builds the system and user instructions for each pipeline stage.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{stage}-{system|user}.pmt` (user override)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution, with HTML
//! escaping disabled so course data is embedded verbatim.

pub mod embedded;
mod loader;
mod stage;

pub use loader::{PromptContext, PromptLoader};
pub use stage::{Stage, StageInput};
