//! LLM Client module for Pulp
//!
//! Provides the provider-agnostic client trait, the concrete provider clients
//! and a few helpers for handling model output.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod lines;
mod ollama;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use lines::LineBuffer;
pub use ollama::OllamaClient;
pub use openai::{OpenAIClient, chat_messages};
pub use types::{
    CompletionRequest, CompletionResponse, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Message, Role, StopReason,
    StreamChunk, TokenUsage,
};

use crate::config::{LlmConfig, ResolvedLlmConfig};

/// Create an LLM client based on the provider specified in config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let resolved = config.resolve().map_err(|e| LlmError::Config(e.to_string()))?;

    create_client_from_resolved(&resolved)
}

/// Create an LLM client from a resolved configuration
pub fn create_client_from_resolved(config: &ResolvedLlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client_from_resolved: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client_from_resolved: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        "openai" | "groq" | "openrouter" | "custom" => {
            debug!("create_client_from_resolved: creating OpenAI-compatible client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        "ollama" => {
            debug!("create_client_from_resolved: creating Ollama client");
            Ok(Arc::new(OllamaClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client_from_resolved: unknown provider");
            Err(LlmError::Config(format!("Unknown LLM provider: '{}'", other)))
        }
    }
}

/// Strip a Markdown code fence wrapped around model output
///
/// Models asked for strict JSON often answer with ```` ```json ... ``` ````.
/// Returns the trimmed inner text, or the trimmed input when there is no fence.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the info string (e.g. "json") on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_json() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_bare() {
        let raw = "```\n{\"a\": 1}\n```\n";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_none() {
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_unterminated() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_create_client_ollama_default() {
        let client = create_client(&LlmConfig::default()).unwrap();
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn test_create_client_groq_uses_openai_compatible() {
        let config = LlmConfig {
            provider: "groq".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let client = create_client(&config).unwrap();
        assert_eq!(client.name(), "groq");
    }

    #[test]
    fn test_create_client_unknown_provider() {
        let config = LlmConfig {
            provider: "bogus".to_string(),
            ..Default::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }
}
