//! Outline generation pipeline
//!
//! Three dependent reasoning-service calls (Analysis, Planning,
//! Organization) refine raw course data into a structured outline. The final
//! text is parsed as a JSON object and reconciled against the input
//! resources.

mod document;
mod error;
mod pipeline;
mod reconcile;
mod runner;
mod state;

pub use document::Outline;
pub use error::PipelineError;
pub use pipeline::{GeneratedOutline, OutlinePipeline};
pub use reconcile::{CategoryReport, CompletenessPolicy, CompletenessReport, reconcile};
pub use runner::{StageOutput, StageRunner};
pub use state::{PipelineRun, PipelineState, StageRecord};
