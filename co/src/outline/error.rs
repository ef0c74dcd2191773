//! Pipeline error types

use std::time::Duration;

use lmsclient::LmsError;
use thiserror::Error;

use super::reconcile::CompletenessReport;
use super::state::PipelineState;
use crate::course::CourseId;
use crate::llm::LlmError;
use crate::prompts::Stage;

/// Errors that abort a pipeline run
///
/// Every variant is terminal; nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch {resource} for course {course_id}: {source}")]
    Fetch {
        resource: &'static str,
        course_id: CourseId,
        #[source]
        source: LmsError,
    },

    #[error("{stage} stage call failed: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("Failed to build {stage} prompt: {message}")]
    Prompt { stage: Stage, message: String },

    #[error("Final outline is not a JSON object: {reason}")]
    MalformedOutput { reason: String, raw: String },

    #[error("Outline is missing {} input resource(s)", .0.missing_total())]
    Incomplete(CompletenessReport),

    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: PipelineState, after: Duration },

    #[error("Cancelled while {phase}")]
    Cancelled { phase: PipelineState },
}

impl PipelineError {
    /// The generation stage the error occurred in, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Generation { stage, .. } | Self::Prompt { stage, .. } => Some(*stage),
            Self::MalformedOutput { .. } | Self::Incomplete(_) => Some(Stage::Organization),
            Self::Timeout { phase, .. } | Self::Cancelled { phase } => match phase {
                PipelineState::Analyzing => Some(Stage::Analysis),
                PipelineState::Planning => Some(Stage::Planning),
                PipelineState::Organizing => Some(Stage::Organization),
                _ => None,
            },
            Self::Fetch { .. } => None,
        }
    }

    /// True when the run failed before any generation call was made
    pub fn is_fatal_fetch(&self) -> bool {
        match self {
            Self::Fetch { .. } => true,
            Self::Timeout { phase, .. } | Self::Cancelled { phase } => *phase == PipelineState::Fetching,
            _ => false,
        }
    }

    /// Raw model text for malformed output
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
