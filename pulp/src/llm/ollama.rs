//! Ollama client implementation
//!
//! Talks to a local Ollama server over `/api/chat`. Streaming responses are
//! newline-delimited JSON rather than SSE.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::lines::LineBuffer;
use super::openai::chat_messages;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, StreamChunk, TokenUsage};
use crate::config::ResolvedLlmConfig;

/// Ollama API client
pub struct OllamaClient {
    model: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl OllamaClient {
    pub fn from_config(config: &ResolvedLlmConfig) -> Result<Self, LlmError> {
        debug!(?config, "from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        debug!(%self.model, %stream, "build_request_body: called");
        serde_json::json!({
            "model": self.model,
            "messages": chat_messages(request),
            "stream": stream,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens.min(self.max_tokens),
            },
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self.http.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            debug!(%status, "send: API error");
            return Err(LlmError::ApiError { status, message: text });
        }
        Ok(response)
    }
}

impl OllamaChatResponse {
    fn stop_reason(&self) -> StopReason {
        self.done_reason
            .as_deref()
            .map(StopReason::from_openai)
            .unwrap_or(StopReason::EndTurn)
    }

    fn usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.prompt_eval_count.unwrap_or(0),
            output_tokens: self.eval_count.unwrap_or(0),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, "complete: called");
        let body = self.build_request_body(&request, false);
        let response = self.send(&body).await?;

        let api_response: OllamaChatResponse = response.json().await?;
        Ok(CompletionResponse {
            stop_reason: api_response.stop_reason(),
            usage: api_response.usage(),
            content: api_response.message.map(|m| m.content).unwrap_or_default(),
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, "stream: called");
        let body = self.build_request_body(&request, true);
        let response = self.send(&body).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut full_content = String::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();

        'outer: while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(LlmError::Network)?;
            lines.push(&chunk);

            while let Some(line) = lines.next_line() {
                if line.is_empty() {
                    continue;
                }

                let event: OllamaChatResponse = serde_json::from_str(&line)?;
                if let Some(error) = event.error {
                    return Err(LlmError::InvalidResponse(error));
                }
                if let Some(message) = &event.message
                    && !message.content.is_empty()
                {
                    full_content.push_str(&message.content);
                    let _ = chunk_tx.send(StreamChunk::TextDelta(message.content.clone())).await;
                }
                if event.done {
                    debug!("stream: done");
                    stop_reason = event.stop_reason();
                    usage = event.usage();
                    break 'outer;
                }
            }
        }

        let _ = chunk_tx
            .send(StreamChunk::MessageDone {
                stop_reason: stop_reason.clone(),
                usage: usage.clone(),
            })
            .await;

        Ok(CompletionResponse {
            content: full_content,
            stop_reason,
            usage,
        })
    }

    async fn ping(&self) -> Result<(), LlmError> {
        debug!(%self.base_url, "ping: called");
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OllamaClient {
        OllamaClient {
            model: "llama3.1:8b".to_string(),
            base_url: "http://localhost:11434".to_string(),
            http: Client::new(),
            max_tokens: 1024,
        }
    }

    #[test]
    fn test_build_request_body() {
        let request = CompletionRequest::new("sys", "hello").with_max_tokens(4000);
        let body = client().build_request_body(&request, true);

        assert_eq!(body["model"], "llama3.1:8b");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 1024);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_parse_final_line() {
        let line = r#"{"model":"m","message":{"role":"assistant","content":""},"done":true,
                       "done_reason":"length","prompt_eval_count":10,"eval_count":20}"#;
        let event: OllamaChatResponse = serde_json::from_str(line).unwrap();

        assert!(event.done);
        assert_eq!(event.stop_reason(), StopReason::MaxTokens);
        assert_eq!(event.usage().total(), 30);
    }
}
