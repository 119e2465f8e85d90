//! Per-chunk structured extraction
//!
//! One model call per chunk. Malformed model output never fails the chunk: it
//! degrades to an extraction whose summary is the raw reply. Transport errors
//! (including the deadline) are returned so the caller can skip the chunk.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::chunker::Chunk;
use crate::llm::{CompletionRequest, LlmClient, LlmError, strip_code_fence};

pub const EXTRACTION_TEMPERATURE: f32 = 0.3;
pub const EXTRACTION_MAX_TOKENS: u32 = 500;

/// Facts pulled out of one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub chunk_id: usize,
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    pub facts: Vec<String>,
    pub summary: String,
}

/// Wire shape of the model reply; any field may be missing or null
#[derive(Debug, Default, Deserialize)]
struct ExtractionPayload {
    key_points: Option<Vec<String>>,
    entities: Option<Vec<String>>,
    facts: Option<Vec<String>>,
    summary: Option<String>,
}

/// Decode a model reply into an [`Extraction`]
///
/// Falls back to using the whole raw reply as the summary when it isn't the
/// expected JSON object.
pub fn parse_extraction(chunk_id: usize, raw: &str) -> Extraction {
    debug!(%chunk_id, raw_len = raw.len(), "parse_extraction: called");
    match serde_json::from_str::<ExtractionPayload>(&strip_code_fence(raw)) {
        Ok(payload) => Extraction {
            chunk_id,
            key_points: payload.key_points.unwrap_or_default(),
            entities: payload.entities.unwrap_or_default(),
            facts: payload.facts.unwrap_or_default(),
            summary: payload.summary.unwrap_or_default(),
        },
        Err(e) => {
            debug!(%chunk_id, error = %e, "parse_extraction: not JSON, keeping raw reply as summary");
            Extraction {
                chunk_id,
                summary: raw.to_string(),
                ..Default::default()
            }
        }
    }
}

/// Runs the extraction prompt against one chunk at a time
#[derive(Clone)]
pub struct Extractor {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    timeout: Duration,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, timeout: Duration) -> Self {
        debug!(?timeout, "Extractor::new: called");
        Self {
            llm,
            system_prompt: system_prompt.into(),
            timeout,
        }
    }

    /// Extract structured facts from one chunk
    pub async fn extract(&self, chunk: &Chunk) -> Result<Extraction, LlmError> {
        debug!(chunk_id = %chunk.id, section = %chunk.section, "Extractor::extract: called");
        let request = CompletionRequest::new(self.system_prompt.clone(), chunk.content.clone())
            .with_max_tokens(EXTRACTION_MAX_TOKENS)
            .with_temperature(EXTRACTION_TEMPERATURE);

        let response = match tokio::time::timeout(self.timeout, self.llm.complete(request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(chunk_id = %chunk.id, timeout = ?self.timeout, "Extractor::extract: deadline exceeded");
                return Err(LlmError::Timeout(self.timeout));
            }
        };

        Ok(parse_extraction(chunk.id, &response.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};

    fn chunk(id: usize, content: &str) -> Chunk {
        Chunk {
            id,
            content: content.to_string(),
            section: String::new(),
            position: id,
        }
    }

    #[test]
    fn test_parse_full_payload() {
        let raw = r#"{"key_points":["a"],"entities":["Acme"],"facts":["10%"],"summary":"s"}"#;
        let ext = parse_extraction(3, raw);
        assert_eq!(ext.chunk_id, 3);
        assert_eq!(ext.key_points, vec!["a"]);
        assert_eq!(ext.entities, vec!["Acme"]);
        assert_eq!(ext.facts, vec!["10%"]);
        assert_eq!(ext.summary, "s");
    }

    #[test]
    fn test_parse_fenced_payload() {
        let raw = "```json\n{\"summary\": \"fenced\"}\n```";
        let ext = parse_extraction(0, raw);
        assert_eq!(ext.summary, "fenced");
        assert!(ext.key_points.is_empty());
    }

    #[test]
    fn test_parse_missing_and_null_fields_default() {
        let ext = parse_extraction(0, r#"{"key_points": null, "facts": ["f"]}"#);
        assert!(ext.key_points.is_empty());
        assert!(ext.entities.is_empty());
        assert_eq!(ext.facts, vec!["f"]);
        assert_eq!(ext.summary, "");
    }

    #[test]
    fn test_parse_malformed_degrades_to_summary() {
        let raw = "Sorry, here is a summary instead.";
        let ext = parse_extraction(7, raw);
        assert_eq!(ext.chunk_id, 7);
        assert_eq!(ext.summary, raw);
        assert!(ext.key_points.is_empty() && ext.entities.is_empty() && ext.facts.is_empty());
    }

    #[tokio::test]
    async fn test_extract_sends_chunk_with_fixed_settings() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::text(r#"{"summary":"ok"}"#)]));
        let extractor = Extractor::new(mock.clone(), "EXTRACT", Duration::from_secs(5));

        let ext = extractor.extract(&chunk(2, "Alpha fact.")).await.unwrap();
        assert_eq!(ext.chunk_id, 2);
        assert_eq!(ext.summary, "ok");

        let req = &mock.requests()[0];
        assert_eq!(req.system_prompt, "EXTRACT");
        assert_eq!(req.last_user_text(), Some("Alpha fact."));
        assert_eq!(req.max_tokens, EXTRACTION_MAX_TOKENS);
        assert!((req.temperature - EXTRACTION_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_extract_transport_error_surfaces() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Fail("down".to_string())]));
        let extractor = Extractor::new(mock, "EXTRACT", Duration::from_secs(5));
        assert!(extractor.extract(&chunk(0, "x")).await.is_err());
    }

    #[tokio::test]
    async fn test_extract_deadline() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Stall(vec![])]));
        let extractor = Extractor::new(mock, "EXTRACT", Duration::from_millis(20));
        let err = extractor.extract(&chunk(0, "x")).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
