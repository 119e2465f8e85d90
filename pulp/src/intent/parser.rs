//! Model-backed intent parsing
//!
//! The model is asked for the intent as strict JSON. Anything it gets wrong
//! falls back field by field to the defaults; a failed call or an undecodable
//! reply yields the default intent.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Action, Audience, ExtractType, Format, Intent, Tone};
use crate::llm::{CompletionRequest, LlmClient, strip_code_fence};
use crate::prompts::PromptLoader;

pub const INTENT_TEMPERATURE: f32 = 0.1;
pub const INTENT_MAX_TOKENS: u32 = 500;

/// Loose wire shape of the model reply
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIntent {
    action: Option<String>,
    tone: Option<String>,
    audience: Option<String>,
    format: Option<String>,
    max_words: Option<serde_json::Value>,
    extract_type: Option<String>,
    style_hints: Option<Vec<String>>,
}

/// Accept `150`, `150.0` or `"150"`; zero means no limit
fn word_limit(value: Option<serde_json::Value>) -> Option<u32> {
    let words = match value? {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (words >= 1.0).then(|| words.min(u32::MAX as f64) as u32)
}

/// Decode a model reply; `None` when it isn't a JSON object
pub fn parse_model_reply(instruction: &str, reply: &str) -> Option<Intent> {
    let raw: RawIntent = match serde_json::from_str(&strip_code_fence(reply)) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "parse_model_reply: undecodable reply");
            return None;
        }
    };

    let action = raw.action.as_deref().and_then(Action::parse).unwrap_or(Action::Summarize);
    Some(Intent {
        action,
        tone: raw.tone.as_deref().and_then(Tone::parse).unwrap_or(Tone::Neutral),
        audience: raw
            .audience
            .as_deref()
            .and_then(Audience::parse)
            .unwrap_or(Audience::General),
        format: raw
            .format
            .as_deref()
            .and_then(Format::parse)
            .unwrap_or_else(|| action.default_format()),
        max_words: word_limit(raw.max_words),
        extract_type: raw.extract_type.as_deref().and_then(ExtractType::parse),
        style_hints: raw
            .style_hints
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect(),
        raw_prompt: instruction.to_string(),
    })
}

/// Asks the model to classify an instruction
pub struct ModelIntentParser {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    timeout: Duration,
}

impl ModelIntentParser {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, timeout: Duration) -> Self {
        debug!(?timeout, "ModelIntentParser::new: called");
        Self { llm, prompts, timeout }
    }

    fn render_prompts(&self, instruction: &str) -> eyre::Result<(String, String)> {
        let system = self.prompts.render("intent", &json!({}))?;
        let user = self
            .prompts
            .render("intent-request", &json!({ "instruction": instruction }))?;
        Ok((system, user))
    }

    /// Parse an instruction, degrading to the default intent on any failure
    ///
    /// Cancellation abandons the model call and also yields the default.
    pub async fn parse(&self, instruction: &str, cancel: &CancellationToken) -> Intent {
        debug!(%instruction, "ModelIntentParser::parse: called");
        let (system, user) = match self.render_prompts(instruction) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "ModelIntentParser::parse: prompt render failed, using default intent");
                return Intent::default_for(instruction);
            }
        };

        let request = CompletionRequest::new(system, user)
            .with_max_tokens(INTENT_MAX_TOKENS)
            .with_temperature(INTENT_TEMPERATURE);

        let call = tokio::time::timeout(self.timeout, self.llm.complete(request));
        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("ModelIntentParser::parse: cancelled");
                return Intent::default_for(instruction);
            }

            result = call => result,
        };

        let reply = match result {
            Ok(Ok(response)) => response.content,
            Ok(Err(e)) => {
                warn!(error = %e, "ModelIntentParser::parse: model call failed, using default intent");
                return Intent::default_for(instruction);
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "ModelIntentParser::parse: deadline exceeded, using default intent");
                return Intent::default_for(instruction);
            }
        };

        parse_model_reply(instruction, &reply).unwrap_or_else(|| {
            warn!("ModelIntentParser::parse: reply was not an intent, using default intent");
            Intent::default_for(instruction)
        })
    }
}
