//! Semantic skill matching
//!
//! Shows the model the catalog and asks which skill, if any, fits the
//! instruction. Low confidence, `"none"`, unknown names and failed calls all
//! mean no match.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SkillMetadata;
use crate::llm::{CompletionRequest, LlmClient, strip_code_fence};
use crate::prompts::PromptLoader;

pub const MATCH_TEMPERATURE: f32 = 0.1;
pub const MATCH_MAX_TOKENS: u32 = 100;
pub const MIN_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct MatchReply {
    #[serde(default)]
    skill: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Serialize)]
struct CatalogEntry<'a> {
    name: &'a str,
    description: &'a str,
}

/// Decode a match reply against the catalog
///
/// Returns the matched skill name and confidence.
pub fn parse_match_reply(reply: &str, catalog: &[SkillMetadata]) -> Option<(String, f64)> {
    let parsed: MatchReply = match serde_json::from_str(&strip_code_fence(reply)) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "parse_match_reply: undecodable reply");
            return None;
        }
    };

    let name = parsed.skill.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("none") || parsed.confidence < MIN_CONFIDENCE {
        debug!(%name, confidence = %parsed.confidence, "parse_match_reply: no match");
        return None;
    }

    catalog
        .iter()
        .find(|meta| meta.name == name)
        .map(|meta| (meta.name.clone(), parsed.confidence))
}

/// Asks the model to pick a skill for an instruction
pub struct SemanticMatcher {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    timeout: Duration,
}

impl SemanticMatcher {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, timeout: Duration) -> Self {
        debug!(?timeout, "SemanticMatcher::new: called");
        Self { llm, prompts, timeout }
    }

    /// Pick the best skill for `instruction`, or `None`
    pub async fn best_match(
        &self,
        instruction: &str,
        catalog: &[SkillMetadata],
        cancel: &CancellationToken,
    ) -> Option<(String, f64)> {
        debug!(%instruction, catalog_size = %catalog.len(), "SemanticMatcher::best_match: called");
        if catalog.is_empty() {
            return None;
        }

        let skills: Vec<CatalogEntry<'_>> = catalog
            .iter()
            .map(|meta| CatalogEntry {
                name: &meta.name,
                description: &meta.description,
            })
            .collect();
        let prompt = match self
            .prompts
            .render("skill-match", &json!({ "instruction": instruction, "skills": skills }))
        {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "SemanticMatcher::best_match: prompt render failed");
                return None;
            }
        };

        let request = CompletionRequest::new(String::new(), prompt)
            .with_max_tokens(MATCH_MAX_TOKENS)
            .with_temperature(MATCH_TEMPERATURE);

        let call = tokio::time::timeout(self.timeout, self.llm.complete(request));
        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("SemanticMatcher::best_match: cancelled");
                return None;
            }

            result = call => result,
        };

        match result {
            Ok(Ok(response)) => parse_match_reply(&response.content, catalog),
            Ok(Err(e)) => {
                warn!(error = %e, "SemanticMatcher::best_match: model call failed");
                None
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "SemanticMatcher::best_match: deadline exceeded");
                None
            }
        }
    }
}
