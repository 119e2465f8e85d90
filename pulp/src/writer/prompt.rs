//! Request shaping for the writer
//!
//! Exactly one branch applies per request: skill-chat when there is no
//! corpus, follow-up when a previous result exists, otherwise first-turn.

use serde_json::json;
use tracing::debug;

use super::WriteRequest;
use crate::intent::{Action, Format, Intent};
use crate::llm::{CompletionRequest, Message};
use crate::prompts::PromptLoader;
use crate::session::TurnRole;

pub const WRITER_TEMPERATURE: f32 = 0.7;
pub const WRITER_MAX_TOKENS: u32 = 2048;

/// Which branch shaped a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    FirstTurn,
    FollowUp,
    SkillChat,
}

impl WriteRequest<'_> {
    pub fn kind(&self) -> RequestKind {
        if self.corpus.is_none() {
            RequestKind::SkillChat
        } else if self.is_follow_up && self.previous_result.is_some_and(|p| !p.is_empty()) {
            RequestKind::FollowUp
        } else {
            RequestKind::FirstTurn
        }
    }
}

fn action_phrase(intent: &Intent) -> String {
    match intent.action {
        Action::Summarize => "Summarize the provided content clearly and concisely.".to_string(),
        Action::Rewrite => "Rewrite the provided content in a new style.".to_string(),
        Action::Extract => {
            let what = intent
                .extract_type
                .map(|kind| kind.as_str().replace('_', " "))
                .unwrap_or_else(|| "key points".to_string());
            format!("Extract {} from the provided content.", what)
        }
        Action::Explain => "Explain the provided content clearly.".to_string(),
        Action::Condense => "Make the provided content more concise while keeping key information.".to_string(),
    }
}

fn format_directive(format: Format) -> Option<&'static str> {
    match format {
        Format::Bullets => Some("Use bullet points."),
        Format::Outline => Some("Structure as an outline with headers."),
        Format::Prose => None,
    }
}

/// Word limit and style hint clauses shared by both document branches
fn constraints(intent: &Intent) -> String {
    let mut out = String::new();
    if let Some(words) = intent.max_words {
        out.push_str(&format!(" Keep the response under {} words.", words));
    }
    if !intent.style_hints.is_empty() {
        out.push_str(&format!(" Also: {}.", intent.style_hints.join("; ")));
    }
    out
}

fn skill_preamble(prompts: &PromptLoader, req: &WriteRequest<'_>) -> eyre::Result<Option<String>> {
    req.skill
        .map(|skill| prompts.render("skill-document", &json!({ "skill_body": skill.body })))
        .transpose()
}

fn first_turn(prompts: &PromptLoader, req: &WriteRequest<'_>, corpus: &str) -> eyre::Result<CompletionRequest> {
    let intent = req.intent;
    let preamble = match skill_preamble(prompts, req)? {
        Some(skill) => skill,
        None => format!("You are a skilled writer. {}", action_phrase(intent)),
    };

    let mut system = format!(
        "{}\nWrite in a {} style. The reader is {}.",
        preamble,
        intent.tone.description(),
        intent.audience.description()
    );
    if let Some(directive) = format_directive(intent.format) {
        system.push(' ');
        system.push_str(directive);
    }
    system.push_str(&constraints(intent));
    system.push_str(&format!("\n\nOriginal request: \"{}\"", intent.raw_prompt));

    let user = match req.doc_title.filter(|t| !t.is_empty()) {
        Some(title) => format!("Document: {}\n\n{}", title, corpus),
        None => corpus.to_string(),
    };
    Ok(CompletionRequest::new(system, user))
}

fn follow_up(prompts: &PromptLoader, req: &WriteRequest<'_>, previous: &str) -> eyre::Result<CompletionRequest> {
    let intent = req.intent;
    let role = match skill_preamble(prompts, req)? {
        Some(skill) => format!("{}\n", skill),
        None => "You are a skilled writer helping revise content. ".to_string(),
    };

    let mut system = format!(
        "{}The user has already received a response and wants changes.\nWrite in a {} style for {}.",
        role,
        intent.tone.description(),
        intent.audience.description()
    );
    system.push_str(&constraints(intent));
    system.push_str(&format!("\n\nUser's revision request: \"{}\"", intent.raw_prompt));

    let user = format!("Previous response to revise:\n\n{}", previous);
    Ok(CompletionRequest::new(system, user))
}

fn skill_chat(prompts: &PromptLoader, req: &WriteRequest<'_>) -> eyre::Result<CompletionRequest> {
    let context = match req.skill {
        Some(skill) => json!({ "skill_name": skill.name(), "skill_body": skill.body }),
        None => json!({}),
    };
    let system = prompts.render("chat", &context)?;

    let mut messages: Vec<Message> = req
        .history
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => Message::user(&turn.content),
            TurnRole::Assistant => Message::assistant(&turn.content),
        })
        .collect();
    messages.push(Message::user(&req.intent.raw_prompt));

    Ok(CompletionRequest {
        system_prompt: system,
        messages,
        max_tokens: WRITER_MAX_TOKENS,
        temperature: WRITER_TEMPERATURE,
    })
}

/// Build the single model request for a write
pub fn build_request(prompts: &PromptLoader, req: &WriteRequest<'_>) -> eyre::Result<CompletionRequest> {
    let kind = req.kind();
    debug!(?kind, has_skill = %req.skill.is_some(), "build_request: called");

    let request = match (kind, req.corpus) {
        (RequestKind::FollowUp, _) => follow_up(prompts, req, req.previous_result.unwrap_or_default())?,
        (RequestKind::FirstTurn, Some(corpus)) => first_turn(prompts, req, &corpus.render())?,
        _ => skill_chat(prompts, req)?,
    };

    Ok(request
        .with_max_tokens(WRITER_MAX_TOKENS)
        .with_temperature(WRITER_TEMPERATURE))
}
