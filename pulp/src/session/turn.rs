//! Conversation turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in a session's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// The most recent assistant turn, if any
pub fn last_assistant(history: &[Turn]) -> Option<&Turn> {
    history.iter().rev().find(|t| t.role == TurnRole::Assistant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_assistant() {
        let history = vec![
            Turn::user("one"),
            Turn::assistant("first"),
            Turn::user("two"),
            Turn::assistant("second"),
            Turn::user("three"),
        ];
        assert_eq!(last_assistant(&history).map(|t| t.content.as_str()), Some("second"));
        assert!(last_assistant(&history[..1]).is_none());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("hi")).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
    }
}
