//! Keyword heuristics for common instructions

use tracing::debug;

use super::{Action, Audience, BRIEF_MAX_WORDS, ExtractType, Format, Intent, Tone};

/// The heuristic result is only trusted when one of these appears
pub const TRIGGERS: &[&str] = &[
    "summarize",
    "summary",
    "action item",
    "key point",
    "bullet",
    "boss",
    "executive",
    "explain",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Resolve common instructions without a model call
///
/// Returns `None` when the instruction contains no trigger word.
pub fn quick_parse(instruction: &str) -> Option<Intent> {
    let lower = instruction.to_lowercase();
    if !contains_any(&lower, TRIGGERS) {
        debug!("quick_parse: no trigger word");
        return None;
    }

    let mut intent = Intent::default_for(instruction);

    if contains_any(&lower, &["action item", "todo"]) {
        intent.action = Action::Extract;
        intent.extract_type = Some(ExtractType::ActionItems);
    } else if contains_any(&lower, &["key point", "main point"]) {
        intent.action = Action::Extract;
        intent.extract_type = Some(ExtractType::KeyPoints);
    } else if lower.contains("explain") {
        intent.action = Action::Explain;
    } else if contains_any(&lower, &["rewrite", "turn into", "make it"]) {
        intent.action = Action::Rewrite;
    } else if contains_any(&lower, &["shorter", "condense"]) {
        intent.action = Action::Condense;
    }

    if contains_any(&lower, &["boss", "executive", "ceo"]) {
        intent.audience = Audience::Executive;
        intent.tone = Tone::Professional;
    } else if contains_any(&lower, &["5", "child", "simple"]) {
        intent.audience = Audience::Child;
        intent.tone = Tone::Simple;
    } else if contains_any(&lower, &["technical", "engineer"]) {
        intent.audience = Audience::Expert;
        intent.tone = Tone::Technical;
    }

    intent.format = if lower.contains("bullet") {
        Format::Bullets
    } else if lower.contains("outline") {
        Format::Outline
    } else {
        intent.action.default_format()
    };

    if contains_any(&lower, &["brief", "short"]) {
        intent.max_words = Some(BRIEF_MAX_WORDS);
    }

    debug!(intent = %intent.summary(), "quick_parse: matched");
    Some(intent)
}
