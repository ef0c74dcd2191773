//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent (fresh context)
///
/// Each completion request starts a new conversation; no state is kept
/// between calls. Stages of the outline pipeline hand text to each other
/// explicitly through their prompts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request (suspends until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
