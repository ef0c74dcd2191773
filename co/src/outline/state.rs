//! Pipeline run state machine

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::course::CourseId;
use crate::llm::TokenUsage;
use crate::prompts::Stage;

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Created, nothing started
    Pending,
    /// Retrieving course data from the LMS
    Fetching,
    Analyzing,
    Planning,
    Organizing,
    /// Final outline parsed (terminal)
    Done,
    /// Run aborted (terminal)
    Failed,
}

impl PipelineState {
    /// State in which the given stage runs
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Analysis => Self::Analyzing,
            Stage::Planning => Self::Planning,
            Stage::Organization => Self::Organizing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Forward-only transitions; any non-terminal state may fail
    ///
    /// `Pending -> Analyzing` covers runs that start from caller-supplied
    /// course data instead of fetching.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Fetching) | (Pending, Analyzing) => true,
            (Fetching, Analyzing) => true,
            (Analyzing, Planning) => true,
            (Planning, Organizing) => true,
            (Organizing, Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Fetching => "FETCHING",
            Self::Analyzing => "ANALYZING",
            Self::Planning => "PLANNING",
            Self::Organizing => "ORGANIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Summary of one completed generation stage
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub model: String,
    pub output_chars: usize,
    pub usage: TokenUsage,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(d.as_millis() as u64)
}

/// One pipeline invocation
///
/// Owns the cancellation token for the run; cancelling it aborts whichever
/// fetch or generation call is in flight.
#[derive(Debug)]
pub struct PipelineRun {
    pub id: Uuid,
    pub course_id: CourseId,
    pub started_at: DateTime<Utc>,
    state: PipelineState,
    history: Vec<(PipelineState, DateTime<Utc>)>,
    stages: Vec<StageRecord>,
    cancel: CancellationToken,
}

impl PipelineRun {
    pub fn new(course_id: CourseId) -> Self {
        Self::with_cancel(course_id, CancellationToken::new())
    }

    /// Create a run driven by an externally owned token
    pub fn with_cancel(course_id: CourseId, cancel: CancellationToken) -> Self {
        let id = Uuid::now_v7();
        let now = Utc::now();
        debug!(%id, %course_id, "PipelineRun::new: called");
        Self {
            id,
            course_id,
            started_at: now,
            state: PipelineState::Pending,
            history: vec![(PipelineState::Pending, now)],
            stages: Vec::new(),
            cancel,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// States visited so far, in order
    pub fn history(&self) -> impl Iterator<Item = PipelineState> + '_ {
        self.history.iter().map(|(s, _)| *s)
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the run
    pub fn cancel(&self) {
        info!(run_id = %self.id, "Cancelling pipeline run");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to the next state; returns false if the transition is not allowed
    pub fn transition(&mut self, next: PipelineState) -> bool {
        debug!(run_id = %self.id, from = %self.state, to = %next, "PipelineRun::transition: called");
        if !self.state.can_transition_to(next) {
            warn!(run_id = %self.id, from = %self.state, to = %next, "Invalid pipeline transition");
            return false;
        }
        info!(run_id = %self.id, course_id = %self.course_id, "Pipeline {} -> {}", self.state, next);
        self.state = next;
        self.history.push((next, Utc::now()));
        true
    }

    /// Mark the run failed; no-op once terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.transition(PipelineState::Failed);
        }
    }

    pub(crate) fn record_stage(&mut self, record: StageRecord) {
        debug!(run_id = %self.id, stage = %record.stage, "PipelineRun::record_stage: called");
        self.stages.push(record);
    }

    /// Token usage summed over completed stages
    pub fn usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for record in &self.stages {
            total += record.usage;
        }
        total
    }
}
