//! Writer: turns the corpus, intent and conversation into final output
//!
//! `write` returns the whole text; `stream` hands back a [`GenerationStream`]
//! fed by a background producer task. The generation deadline and caller
//! cancellation both apply to the producer.

mod prompt;

pub use prompt::{RequestKind, WRITER_MAX_TOKENS, WRITER_TEMPERATURE, build_request};

use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::intent::Intent;
use crate::llm::{CompletionRequest, LlmClient, LlmError, StreamChunk};
use crate::pipeline::AggregatedCorpus;
use crate::prompts::PromptLoader;
use crate::session::Turn;
use crate::skill::Skill;

/// Reported when the producer stops without `MessageDone` or `Error`
pub const GENERATION_ENDED: &str = "generation ended unexpectedly";

/// Everything one generation needs
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    /// `None` in skill-chat mode
    pub corpus: Option<&'a AggregatedCorpus>,
    pub intent: &'a Intent,
    pub doc_title: Option<&'a str>,
    /// Turns before the current instruction
    pub history: &'a [Turn],
    pub is_follow_up: bool,
    pub previous_result: Option<&'a str>,
    pub skill: Option<&'a Skill>,
}

/// Generates output through the model
pub struct Writer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    timeout: Duration,
    buffer: usize,
}

impl Writer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, timeout: Duration, buffer: usize) -> Self {
        debug!(?timeout, %buffer, "Writer::new: called");
        Self {
            llm,
            prompts,
            timeout,
            buffer: buffer.max(1),
        }
    }

    pub fn build_request(&self, req: &WriteRequest<'_>) -> Result<CompletionRequest> {
        build_request(&self.prompts, req).context("Failed to build generation request")
    }

    /// Generate the complete output in one call
    pub async fn write(&self, req: &WriteRequest<'_>) -> Result<String> {
        debug!("Writer::write: called");
        let request = self.build_request(req)?;
        let response = tokio::time::timeout(self.timeout, self.llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
            .context("Generation failed")?;
        Ok(response.content)
    }

    /// Start a streaming generation
    ///
    /// The returned stream yields fragments in generation order, then a
    /// `MessageDone` or an `Error`. Cancelling `cancel` stops the producer.
    pub fn stream(&self, req: &WriteRequest<'_>, cancel: &CancellationToken) -> Result<GenerationStream> {
        debug!(kind = ?req.kind(), "Writer::stream: called");
        let request = self.build_request(req)?;
        Ok(GenerationStream::spawn(
            self.llm.clone(),
            request,
            self.timeout,
            self.buffer,
            cancel.child_token(),
        ))
    }
}

/// Receiving end of a streaming generation
pub struct GenerationStream {
    rx: mpsc::Receiver<StreamChunk>,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl GenerationStream {
    fn spawn(
        llm: Arc<dyn LlmClient>,
        request: CompletionRequest,
        timeout: Duration,
        buffer: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<StreamChunk>(buffer);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            debug!("GenerationStream: producer started");
            let error_tx = tx.clone();
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("GenerationStream: producer cancelled");
                }

                result = tokio::time::timeout(timeout, llm.stream(request, tx)) => {
                    let error = match result {
                        Ok(Ok(response)) => {
                            debug!(usage = ?response.usage, "GenerationStream: producer finished");
                            None
                        }
                        Ok(Err(e)) => Some(e),
                        Err(_) => Some(LlmError::Timeout(timeout)),
                    };
                    if let Some(e) = error {
                        warn!(error = %e, "GenerationStream: generation failed");
                        let _ = error_tx.send(StreamChunk::Error(e.to_string())).await;
                    }
                }
            }
        });

        Self { rx, handle, cancel }
    }

    /// Next chunk, or `None` once the producer has gone away
    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }

    /// Stop the producer early
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the producer and wait for it to exit
    pub async fn finish(self) {
        let Self { rx, handle, cancel } = self;
        cancel.cancel();
        // Unblocks a producer waiting on a full channel
        drop(rx);
        if let Err(e) = handle.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "GenerationStream::finish: producer task failed");
        }
    }

    /// Drain the stream into the complete text
    pub async fn collect(mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next().await {
                Some(StreamChunk::TextDelta(fragment)) => text.push_str(&fragment),
                Some(StreamChunk::MessageDone { .. }) => break,
                Some(StreamChunk::Error(message)) => {
                    self.finish().await;
                    return Err(eyre::eyre!(message));
                }
                None => {
                    self.finish().await;
                    return Err(eyre::eyre!(GENERATION_ENDED));
                }
            }
        }
        self.finish().await;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};

    fn writer(mock: Arc<MockLlmClient>, timeout: Duration) -> Writer {
        Writer::new(mock, Arc::new(PromptLoader::embedded_only()), timeout, 4)
    }

    fn corpus() -> AggregatedCorpus {
        AggregatedCorpus {
            summaries: vec!["A summary.".to_string()],
            word_count: 2,
            ..Default::default()
        }
    }

    fn request<'a>(corpus: &'a AggregatedCorpus, intent: &'a Intent) -> WriteRequest<'a> {
        WriteRequest {
            corpus: Some(corpus),
            intent,
            doc_title: None,
            history: &[],
            is_follow_up: false,
            previous_result: None,
            skill: None,
        }
    }

    #[tokio::test]
    async fn test_write_returns_text() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::text("Done.")]));
        let corpus = corpus();
        let intent = Intent::default_for("summarize");

        let out = writer(mock.clone(), Duration::from_secs(1))
            .write(&request(&corpus, &intent))
            .await
            .unwrap();
        assert_eq!(out, "Done.");
        assert!(mock.requests()[0].last_user_text().unwrap().contains("A summary."));
    }

    #[tokio::test]
    async fn test_write_times_out() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Stall(vec![])]));
        let corpus = corpus();
        let intent = Intent::default_for("summarize");

        let err = writer(mock, Duration::from_millis(20))
            .write(&request(&corpus, &intent))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Timeout after"));
    }

    #[tokio::test]
    async fn test_stream_preserves_order() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::fragments(&["One", ", two", ", three"])]));
        let corpus = corpus();
        let intent = Intent::default_for("summarize");
        let cancel = CancellationToken::new();

        let mut stream = writer(mock, Duration::from_secs(1))
            .stream(&request(&corpus, &intent), &cancel)
            .unwrap();

        let mut fragments = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::TextDelta(text) => fragments.push(text),
                other => {
                    assert!(matches!(other, StreamChunk::MessageDone { .. }));
                    break;
                }
            }
        }
        stream.finish().await;
        assert_eq!(fragments, vec!["One", ", two", ", three"]);
    }

    #[tokio::test]
    async fn test_stream_failure_ends_with_error() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Fail("overloaded".to_string())]));
        let corpus = corpus();
        let intent = Intent::default_for("summarize");

        let stream = writer(mock, Duration::from_secs(1))
            .stream(&request(&corpus, &intent), &CancellationToken::new())
            .unwrap();
        let err = stream.collect().await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_stream_without_done_is_an_error() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Truncated(vec!["half a".to_string()])]));
        let corpus = corpus();
        let intent = Intent::default_for("summarize");

        let stream = writer(mock, Duration::from_secs(1))
            .stream(&request(&corpus, &intent), &CancellationToken::new())
            .unwrap();
        let err = stream.collect().await.unwrap_err();
        assert_eq!(err.to_string(), GENERATION_ENDED);
    }

    #[tokio::test]
    async fn test_stream_deadline_ends_with_error() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Stall(vec!["partial".to_string()])]));
        let corpus = corpus();
        let intent = Intent::default_for("summarize");

        let mut stream = writer(mock, Duration::from_millis(30))
            .stream(&request(&corpus, &intent), &CancellationToken::new())
            .unwrap();
        assert_eq!(stream.next().await, Some(StreamChunk::TextDelta("partial".to_string())));
        assert!(matches!(stream.next().await, Some(StreamChunk::Error(_))));
        stream.finish().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_producer() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Stall(vec!["partial".to_string()])]));
        let corpus = corpus();
        let intent = Intent::default_for("summarize");
        let cancel = CancellationToken::new();

        let mut stream = writer(mock, Duration::from_secs(60))
            .stream(&request(&corpus, &intent), &cancel)
            .unwrap();
        assert_eq!(stream.next().await, Some(StreamChunk::TextDelta("partial".to_string())));

        cancel.cancel();
        // Producer exits without a terminal marker
        assert_eq!(stream.next().await, None);
        stream.finish().await;
    }
}
