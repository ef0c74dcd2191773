//! Generation stage runner
//!
//! One stage is exactly one reasoning-service call in JSON-object mode. The
//! runner does not validate the returned text; parsing happens only after
//! the final stage.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::state::PipelineState;
use crate::llm::{CompletionRequest, LlmClient, Message, ResponseFormat, StopReason, TokenUsage};
use crate::prompts::{Stage, StageInput};

/// Raw text produced by one stage
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: Stage,
    pub model: String,
    pub text: String,
    pub usage: TokenUsage,
    pub elapsed: Duration,
}

/// Executes single generation stages
pub struct StageRunner {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
    deadline: Duration,
}

impl StageRunner {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: u32, deadline: Duration) -> Self {
        debug!(%max_tokens, ?deadline, "StageRunner::new: called");
        Self {
            llm,
            max_tokens,
            deadline,
        }
    }

    /// Run one stage against `model`, or the client's own model when `None`
    ///
    /// Empty content comes back as empty text. Any call failure, expired
    /// deadline or cancellation ends the stage with an error.
    pub async fn run(
        &self,
        stage: Stage,
        input: StageInput,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StageOutput, PipelineError> {
        debug!(%stage, ?model, "StageRunner::run: called");
        let phase = PipelineState::for_stage(stage);

        let request = CompletionRequest {
            system_prompt: input.system_instruction,
            messages: vec![Message::user(input.user_instruction)],
            model: model.map(str::to_string),
            response_format: ResponseFormat::JsonObject,
            max_tokens: self.max_tokens,
        };

        let start = Instant::now();
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%stage, "StageRunner::run: cancelled");
                return Err(PipelineError::Cancelled { phase });
            }
            result = tokio::time::timeout(self.deadline, self.llm.complete(request)) => match result {
                Ok(Ok(response)) => response,
                Ok(Err(source)) => {
                    debug!(%stage, error = %source, "StageRunner::run: call failed");
                    return Err(PipelineError::Generation { stage, source });
                }
                Err(_) => {
                    debug!(%stage, "StageRunner::run: deadline expired");
                    return Err(PipelineError::Timeout { phase, after: self.deadline });
                }
            },
        };
        let elapsed = start.elapsed();

        if response.stop_reason == StopReason::MaxTokens {
            warn!(%stage, "Stage output hit the token limit and may be truncated");
        }

        let text = response.content.unwrap_or_default();
        if text.is_empty() {
            debug!(%stage, "StageRunner::run: empty content");
        }
        info!(
            "{} stage finished in {:.1}s ({} chars, {} tokens)",
            stage,
            elapsed.as_secs_f64(),
            text.len(),
            response.usage.total()
        );

        Ok(StageOutput {
            stage,
            model: response.model.or_else(|| model.map(str::to_string)).unwrap_or_default(),
            text,
            usage: response.usage,
            elapsed,
        })
    }
}
