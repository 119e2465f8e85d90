//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Stateless LLM client - each call is independent
///
/// Conversation state lives with the caller: every request carries the full
/// message list it needs. Implementations never retry; a failed call is
/// reported once and the caller decides what to degrade.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logs and the `ping` command
    fn name(&self) -> &str;

    /// Send a single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion
    ///
    /// Sends `TextDelta`s to the channel as they arrive followed by a
    /// `MessageDone`, and returns the final complete response. On failure the
    /// error is returned without a terminal chunk; the consumer owns error
    /// reporting. A closed receiver is not an error.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;

    /// Cheap health check against the provider
    async fn ping(&self) -> Result<(), LlmError>;
}
