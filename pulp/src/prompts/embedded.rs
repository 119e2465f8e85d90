//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Per-chunk structured extraction
pub const EXTRACTION: &str = include_str!("../../prompts/extraction.pmt");

/// Intent parser system prompt
pub const INTENT: &str = include_str!("../../prompts/intent.pmt");

/// Intent parser user message
pub const INTENT_REQUEST: &str = include_str!("../../prompts/intent-request.pmt");

/// Semantic skill matcher
pub const SKILL_MATCH: &str = include_str!("../../prompts/skill-match.pmt");

/// Base chat prompt, with an optional skill block
pub const CHAT: &str = include_str!("../../prompts/chat.pmt");

/// Skill body wrapper for document turns
pub const SKILL_DOCUMENT: &str = include_str!("../../prompts/skill-document.pmt");

/// Names of every embedded prompt
pub const NAMES: &[&str] = &[
    "extraction",
    "intent",
    "intent-request",
    "skill-match",
    "chat",
    "skill-document",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "extraction" => Some(EXTRACTION),
        "intent" => Some(INTENT),
        "intent-request" => Some(INTENT_REQUEST),
        "skill-match" => Some(SKILL_MATCH),
        "chat" => Some(CHAT),
        "skill-document" => Some(SKILL_DOCUMENT),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
