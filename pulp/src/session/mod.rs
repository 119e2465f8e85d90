//! Session orchestration
//!
//! A [`Session`] owns one open document (or none, in skill-chat mode), its
//! corpus and its conversation. Each call to [`Session::submit`] runs one
//! turn: resolve skill, resolve intent, record the instruction, run the
//! pipeline on the first turn, then stream the generation.
//!
//! A cancelled or failed turn leaves the history as if it never ran.

mod events;
mod turn;

pub use events::{SessionEvent, SessionState, TurnOutcome};
pub use turn::{Turn, TurnRole, last_assistant};

use std::sync::Arc;

use eyre::{Context, Result};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::document::Document;
use crate::intent::{Intent, IntentResolver, ModelIntentParser};
use crate::llm::{LlmClient, StreamChunk};
use crate::pipeline::{AggregatedCorpus, Pipeline, PipelineError, Progress};
use crate::prompts::PromptLoader;
use crate::skill::{SemanticMatcher, Skill, SkillResolver, SkillStore};
use crate::writer::{GENERATION_ENDED, WriteRequest, Writer};

/// Sender half of the display channel
pub type EventSink = mpsc::UnboundedSender<SessionEvent>;

/// The collaborators a session drives, shared across sessions
pub struct SessionServices {
    pub pipeline: Pipeline,
    pub intents: IntentResolver,
    pub skills: SkillResolver,
    pub writer: Writer,
}

impl SessionServices {
    /// Wire every collaborator to one model client
    pub fn from_config(config: &Config, llm: Arc<dyn LlmClient>, store: Arc<dyn SkillStore>) -> Result<Self> {
        debug!(provider = %llm.name(), "SessionServices::from_config: called");
        let prompts = Arc::new(PromptLoader::new(config.prompts_path()));
        let timeouts = &config.pipeline;

        let extraction_prompt = prompts
            .render("extraction", &json!({}))
            .context("Failed to render extraction prompt")?;
        let pipeline = Pipeline::new(llm.clone(), extraction_prompt, &config.pipeline);

        let intents = IntentResolver::new(ModelIntentParser::new(
            llm.clone(),
            prompts.clone(),
            timeouts.intent_timeout(),
        ));

        let matcher = config
            .skills
            .auto_match
            .then(|| SemanticMatcher::new(llm.clone(), prompts.clone(), timeouts.skill_match_timeout()));
        let skills = SkillResolver::new(store, matcher);

        let writer = Writer::new(llm, prompts, timeouts.generation_timeout(), timeouts.stream_buffer);

        Ok(Self {
            pipeline,
            intents,
            skills,
            writer,
        })
    }
}

/// Everything resolved before the expensive work starts
struct PreparedTurn {
    instruction: String,
    intent: Intent,
}

/// One open document and its conversation
pub struct Session {
    id: Uuid,
    document: Option<Document>,
    services: Arc<SessionServices>,
    corpus: Option<AggregatedCorpus>,
    history: Vec<Turn>,
    is_follow_up: bool,
    active_skill: Option<Skill>,
    state: SessionState,
}

impl Session {
    /// Session over a loaded document
    pub fn new(document: Document, services: Arc<SessionServices>) -> Self {
        let session = Self::build(Some(document), services);
        info!(session = %session.id, "Opened document session");
        session
    }

    /// Skill-chat session with no document
    pub fn chat(services: Arc<SessionServices>) -> Self {
        let session = Self::build(None, services);
        info!(session = %session.id, "Opened chat session");
        session
    }

    fn build(document: Option<Document>, services: Arc<SessionServices>) -> Self {
        Self {
            id: Uuid::now_v7(),
            document,
            services,
            corpus: None,
            history: Vec::new(),
            is_follow_up: false,
            active_skill: None,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn corpus(&self) -> Option<&AggregatedCorpus> {
        self.corpus.as_ref()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn is_follow_up(&self) -> bool {
        self.is_follow_up
    }

    pub fn active_skill(&self) -> Option<&Skill> {
        self.active_skill.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn services(&self) -> &Arc<SessionServices> {
        &self.services
    }

    /// Forget the corpus, history and active skill; keep the document
    pub fn reset(&mut self) {
        debug!(session = %self.id, "Session::reset: called");
        self.corpus = None;
        self.history.clear();
        self.is_follow_up = false;
        self.active_skill = None;
        self.state = SessionState::Idle;
    }

    /// Run one turn
    ///
    /// Emits display events as the turn progresses and always finishes with
    /// exactly one terminal event (`Done`, `Error` or `Cancelled`). Only a
    /// completed turn changes the history.
    pub async fn submit(&mut self, instruction: &str, events: &EventSink, cancel: &CancellationToken) -> TurnOutcome {
        debug!(session = %self.id, %instruction, "Session::submit: called");
        let history_len = self.history.len();
        let saved_skill = self.active_skill.clone();

        let outcome = match self.run_turn(instruction, events, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => TurnOutcome::Failed {
                message: format!("{:#}", e),
            },
        };

        match &outcome {
            TurnOutcome::Completed { content } => {
                info!(session = %self.id, chars = content.len(), "Turn completed");
                let _ = events.send(SessionEvent::Done {
                    content: content.clone(),
                });
            }
            TurnOutcome::Cancelled => {
                info!(session = %self.id, "Turn cancelled");
                self.history.truncate(history_len);
                self.active_skill = saved_skill;
                let _ = events.send(SessionEvent::Cancelled);
            }
            TurnOutcome::Failed { message } => {
                warn!(session = %self.id, %message, "Turn failed");
                self.history.truncate(history_len);
                self.active_skill = saved_skill;
                let _ = events.send(SessionEvent::Error(message.clone()));
            }
        }

        self.state = SessionState::Idle;
        outcome
    }

    async fn prepare(&mut self, instruction: &str, events: &EventSink, cancel: &CancellationToken) -> PreparedTurn {
        let services = self.services.clone();

        let resolution = services
            .skills
            .resolve(instruction, self.active_skill.is_some(), cancel)
            .await;
        if let Some(resolved) = resolution.skill {
            let _ = events.send(SessionEvent::SkillActivated {
                name: resolved.skill.name().to_string(),
                source: resolved.source.clone(),
            });
            self.active_skill = Some(resolved.skill);
        }

        let instruction = resolution.instruction;
        let intent = if self.document.is_some() && !cancel.is_cancelled() {
            let intent = services.intents.resolve(&instruction, cancel).await;
            if !cancel.is_cancelled() {
                let _ = events.send(SessionEvent::IntentResolved(intent.clone()));
            }
            intent
        } else {
            Intent::default_for(instruction.as_str())
        };

        PreparedTurn { instruction, intent }
    }

    /// Run the pipeline unless this document already has a corpus
    async fn ensure_corpus(&mut self, events: &EventSink, cancel: &CancellationToken) -> Result<Option<TurnOutcome>> {
        let Some(document) = self.document.as_ref() else {
            return Ok(None);
        };
        if self.corpus.is_some() {
            return Ok(None);
        }

        self.state = SessionState::Extracting;
        let services = self.services.clone();
        let progress = |p: Progress| {
            let _ = events.send(SessionEvent::Progress(p));
        };

        match services.pipeline.run(&document.content, &progress, cancel).await {
            Ok(result) => {
                if !result.failed_chunks.is_empty() {
                    warn!(failed = ?result.failed_chunks, "Session::ensure_corpus: some chunks were skipped");
                }
                self.corpus = Some(result.corpus);
                self.state = SessionState::Aggregated;
                Ok(None)
            }
            Err(PipelineError::Cancelled) => Ok(Some(TurnOutcome::Cancelled)),
            Err(PipelineError::NoContent) => Ok(Some(TurnOutcome::Failed {
                message: PipelineError::NoContent.to_string(),
            })),
            Err(e) => Err(e).context("Document processing failed"),
        }
    }

    async fn run_turn(&mut self, instruction: &str, events: &EventSink, cancel: &CancellationToken) -> Result<TurnOutcome> {
        let prepared = self.prepare(instruction, events, cancel).await;
        if cancel.is_cancelled() {
            return Ok(TurnOutcome::Cancelled);
        }

        let history_len = self.history.len();
        self.history.push(Turn::user(prepared.instruction.as_str()));

        if let Some(outcome) = self.ensure_corpus(events, cancel).await? {
            return Ok(outcome);
        }

        self.state = SessionState::Streaming;
        let prior = &self.history[..history_len];
        let request = WriteRequest {
            corpus: self.corpus.as_ref(),
            intent: &prepared.intent,
            doc_title: self.document.as_ref().map(|d| d.title.as_str()),
            history: prior,
            is_follow_up: self.is_follow_up,
            previous_result: last_assistant(prior).map(|t| t.content.as_str()),
            skill: self.active_skill.as_ref(),
        };
        let mut stream = self.services.writer.stream(&request, cancel)?;

        let mut content = String::new();
        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break TurnOutcome::Cancelled,

                chunk = stream.next() => match chunk {
                    Some(StreamChunk::TextDelta(text)) => {
                        content.push_str(&text);
                        let _ = events.send(SessionEvent::Fragment(text));
                    }
                    Some(StreamChunk::MessageDone { .. }) => {
                        break TurnOutcome::Completed { content: std::mem::take(&mut content) };
                    }
                    // Producer gone without a terminal chunk: never commit the partial text
                    None if cancel.is_cancelled() => break TurnOutcome::Cancelled,
                    None => break TurnOutcome::Failed { message: GENERATION_ENDED.to_string() },
                    Some(StreamChunk::Error(message)) => break TurnOutcome::Failed { message },
                },
            }
        };
        stream.finish().await;

        if let TurnOutcome::Completed { content } = &outcome {
            self.history.push(Turn::assistant(content.as_str()));
            self.is_follow_up = true;
        }
        Ok(outcome)
    }
}
