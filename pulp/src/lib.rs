//! Pulp - document intelligence
//!
//! Pulp turns a long document into something a person asked for: a summary
//! for their boss, the action items, a plain-language explanation. The
//! document is chunked and each chunk's key points, entities and facts are
//! extracted concurrently; the deduplicated corpus is then handed to a writer
//! that streams the final answer. Follow-up instructions revise the previous
//! answer without re-reading the document.
//!
//! # Modules
//!
//! - [`document`] - Loading and converting source documents
//! - [`pipeline`] - Chunking, extraction and aggregation
//! - [`intent`] - Turning instructions into typed intents
//! - [`skill`] - Stored instruction sets and skill matching
//! - [`writer`] - Generation requests and streaming
//! - [`session`] - Turn orchestration and cancellation
//! - [`llm`] - Provider clients
//! - [`repl`] - Interactive terminal front end
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod document;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod repl;
pub mod session;
pub mod skill;
pub mod writer;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use document::{Document, DocumentError};
pub use intent::{Intent, IntentResolver};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StreamChunk, create_client};
pub use pipeline::{AggregatedCorpus, Pipeline, PipelineError, Progress, Stage};
pub use session::{Session, SessionEvent, SessionServices, SessionState, Turn, TurnOutcome};
pub use skill::{FsSkillStore, Skill, SkillError, SkillStore};
pub use writer::{GenerationStream, WriteRequest, Writer};
