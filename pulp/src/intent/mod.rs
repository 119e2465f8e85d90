//! Instruction intent
//!
//! An [`Intent`] is the small typed directive the writer works from. It is
//! resolved from the free-form instruction by an ordered list of matchers:
//! cheap keyword heuristics first, then a model call.

mod heuristic;
mod parser;

pub use heuristic::{TRIGGERS, quick_parse};
pub use parser::{INTENT_MAX_TOKENS, INTENT_TEMPERATURE, ModelIntentParser, parse_model_reply};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Word limit applied by "brief"/"short"
pub const BRIEF_MAX_WORDS: u32 = 150;

/// Normalise an enum spelling from user or model text
fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', ' '], "_")
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Parse a (case-insensitive) name; `None` when unrecognised
            pub fn parse(s: &str) -> Option<Self> {
                match normalize(s).as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

string_enum! {
    /// What to do with the document
    Action {
        Summarize => "summarize",
        Rewrite => "rewrite",
        Extract => "extract",
        Explain => "explain",
        Condense => "condense",
    }
}

string_enum! {
    Tone {
        Professional => "professional",
        Casual => "casual",
        Technical => "technical",
        Academic => "academic",
        Simple => "simple",
        Neutral => "neutral",
    }
}

string_enum! {
    Audience {
        Executive => "executive",
        Expert => "expert",
        General => "general",
        Child => "child",
    }
}

string_enum! {
    Format {
        Prose => "prose",
        Bullets => "bullets",
        Outline => "outline",
    }
}

string_enum! {
    /// What to pull out when the action is `extract`
    ExtractType {
        ActionItems => "action_items",
        KeyPoints => "key_points",
        Quotes => "quotes",
        Facts => "facts",
    }
}

impl Action {
    /// Format used when the instruction doesn't ask for one
    pub fn default_format(&self) -> Format {
        match self {
            Action::Extract => Format::Bullets,
            _ => Format::Prose,
        }
    }
}

impl Tone {
    /// Clause used in the writer instruction
    pub fn description(&self) -> &'static str {
        match self {
            Tone::Professional => "professional, polished",
            Tone::Casual => "casual, conversational",
            Tone::Technical => "precise, technical",
            Tone::Academic => "formal, academic",
            Tone::Simple => "simple, plain-language",
            Tone::Neutral => "clear, neutral",
        }
    }
}

impl Audience {
    /// Clause used in the writer instruction
    pub fn description(&self) -> &'static str {
        match self {
            Audience::Executive => "a busy executive who needs the bottom line",
            Audience::Expert => "a domain expert comfortable with technical detail",
            Audience::General => "a general reader",
            Audience::Child => "a young child",
        }
    }
}

/// Resolved directive for one instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: Action,
    pub tone: Tone,
    pub audience: Audience,
    pub format: Format,
    pub max_words: Option<u32>,
    pub extract_type: Option<ExtractType>,
    pub style_hints: Vec<String>,
    /// The instruction exactly as the user typed it
    pub raw_prompt: String,
}

impl Intent {
    /// summarize / neutral / general / prose
    pub fn default_for(raw_prompt: impl Into<String>) -> Self {
        Self {
            action: Action::Summarize,
            tone: Tone::Neutral,
            audience: Audience::General,
            format: Format::Prose,
            max_words: None,
            extract_type: None,
            style_hints: Vec::new(),
            raw_prompt: raw_prompt.into(),
        }
    }

    /// One-line description for logs and the display
    pub fn summary(&self) -> String {
        let mut parts = vec![
            self.action.to_string(),
            self.tone.to_string(),
            self.audience.to_string(),
            self.format.to_string(),
        ];
        if let Some(kind) = self.extract_type {
            parts.push(kind.to_string());
        }
        if let Some(words) = self.max_words {
            parts.push(format!("≤{} words", words));
        }
        parts.join(" · ")
    }
}

/// One strategy for turning an instruction into an intent
pub enum IntentMatcher {
    /// Keyword rules; only fires on trigger words
    Heuristic,
    /// Model call; always answers, degrading to the default intent
    Model(ModelIntentParser),
}

impl IntentMatcher {
    pub fn name(&self) -> &'static str {
        match self {
            IntentMatcher::Heuristic => "heuristic",
            IntentMatcher::Model(_) => "model",
        }
    }

    async fn try_match(&self, instruction: &str, cancel: &CancellationToken) -> Option<Intent> {
        match self {
            IntentMatcher::Heuristic => quick_parse(instruction),
            IntentMatcher::Model(parser) => Some(parser.parse(instruction, cancel).await),
        }
    }
}

/// Tries each matcher in order
pub struct IntentResolver {
    matchers: Vec<IntentMatcher>,
}

impl IntentResolver {
    /// Heuristics, then the model parser
    pub fn new(model: ModelIntentParser) -> Self {
        Self::with_matchers(vec![IntentMatcher::Heuristic, IntentMatcher::Model(model)])
    }

    pub fn with_matchers(matchers: Vec<IntentMatcher>) -> Self {
        debug!(matcher_count = matchers.len(), "IntentResolver::with_matchers: called");
        Self { matchers }
    }

    /// Resolve an instruction; never fails
    ///
    /// A cancelled resolution returns the default intent; the caller checks
    /// the token to tell the two apart.
    pub async fn resolve(&self, instruction: &str, cancel: &CancellationToken) -> Intent {
        debug!(%instruction, "IntentResolver::resolve: called");
        for matcher in &self.matchers {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(intent) = matcher.try_match(instruction, cancel).await {
                info!("Intent via {}: {}", matcher.name(), intent.summary());
                return intent;
            }
        }
        debug!("IntentResolver::resolve: no matcher answered, using default");
        Intent::default_for(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use crate::prompts::PromptLoader;
    use std::sync::Arc;
    use std::time::Duration;

    fn resolver(mock: Arc<MockLlmClient>) -> IntentResolver {
        let parser = ModelIntentParser::new(mock, Arc::new(PromptLoader::embedded_only()), Duration::from_secs(5));
        IntentResolver::new(parser)
    }

    #[test]
    fn test_enum_parse_is_lenient() {
        assert_eq!(ExtractType::parse("Action-Items"), Some(ExtractType::ActionItems));
        assert_eq!(ExtractType::parse("key points"), Some(ExtractType::KeyPoints));
        assert_eq!(Tone::parse(" ACADEMIC "), Some(Tone::Academic));
        assert_eq!(Format::parse("table"), None);
    }

    #[test]
    fn test_enum_serde_names() {
        let json = serde_json::to_string(&ExtractType::ActionItems).unwrap();
        assert_eq!(json, "\"action_items\"");
        assert_eq!(Action::Condense.to_string(), "condense");
    }

    #[test]
    fn test_default_intent() {
        let intent = Intent::default_for("whatever");
        assert_eq!(intent.action, Action::Summarize);
        assert_eq!(intent.tone, Tone::Neutral);
        assert_eq!(intent.audience, Audience::General);
        assert_eq!(intent.format, Format::Prose);
        assert_eq!(intent.raw_prompt, "whatever");
    }

    #[test]
    fn test_intent_summary() {
        let mut intent = Intent::default_for("x");
        intent.max_words = Some(150);
        assert_eq!(intent.summary(), "summarize · neutral · general · prose · ≤150 words");
    }

    #[tokio::test]
    async fn test_trigger_instruction_skips_model() {
        let mock = Arc::new(MockLlmClient::new(vec![]));
        let intent = resolver(mock.clone()).resolve("summarize for my boss", &CancellationToken::new()).await;

        assert_eq!(intent.action, Action::Summarize);
        assert_eq!(intent.tone, Tone::Professional);
        assert_eq!(intent.audience, Audience::Executive);
        assert_eq!(intent.format, Format::Prose);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bullet_points_instruction() {
        let mock = Arc::new(MockLlmClient::new(vec![]));
        let intent = resolver(mock).resolve("give me bullet points", &CancellationToken::new()).await;
        assert_eq!(intent.format, Format::Bullets);
    }

    #[tokio::test]
    async fn test_non_trigger_instruction_calls_model_once() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::text(
            r#"{"action":"rewrite","tone":"casual","audience":"general","format":"prose"}"#,
        )]));
        let intent = resolver(mock.clone()).resolve("turn this into a blog post", &CancellationToken::new()).await;

        assert_eq!(mock.call_count(), 1);
        assert_eq!(intent.action, Action::Rewrite);
        assert_eq!(intent.tone, Tone::Casual);
        assert_eq!(intent.raw_prompt, "turn this into a blog post");
    }

    #[tokio::test]
    async fn test_model_failure_yields_default() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::Fail("down".to_string())]));
        let intent = resolver(mock.clone()).resolve("do something clever", &CancellationToken::new()).await;

        assert_eq!(mock.call_count(), 1);
        assert_eq!(intent, Intent::default_for("do something clever"));
    }

    #[tokio::test]
    async fn test_cancelled_resolution_skips_model() {
        let mock = Arc::new(MockLlmClient::new(vec![MockReply::text(r#"{"action":"rewrite"}"#)]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let intent = resolver(mock.clone()).resolve("do something clever", &cancel).await;
        assert_eq!(mock.call_count(), 0);
        assert_eq!(intent, Intent::default_for("do something clever"));
    }

    #[tokio::test]
    async fn test_empty_matcher_list_is_default() {
        let resolver = IntentResolver::with_matchers(vec![]);
        assert_eq!(resolver.resolve("hi", &CancellationToken::new()).await, Intent::default_for("hi"));
    }
}
