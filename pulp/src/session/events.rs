//! Events a session emits to its display

use crate::intent::Intent;
use crate::pipeline::Progress;
use crate::skill::SkillSource;

/// Display event for one turn
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Progress(Progress),
    IntentResolved(Intent),
    SkillActivated { name: String, source: SkillSource },
    /// Generated text, in order
    Fragment(String),
    Done { content: String },
    Error(String),
    Cancelled,
}

impl SessionEvent {
    /// Whether this event ends the turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Done { .. } | SessionEvent::Error(_) | SessionEvent::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Extracting,
    Aggregated,
    Streaming,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Extracting => write!(f, "extracting"),
            SessionState::Aggregated => write!(f, "aggregated"),
            SessionState::Streaming => write!(f, "streaming"),
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { content: String },
    Cancelled,
    Failed { message: String },
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}
