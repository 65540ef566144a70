//! Conversation turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker that opens every compaction summary turn
pub const SUMMARY_PREFIX: &str = "This is a summary of our conversation so far: ";

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// One role-tagged message. Never edited once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    /// Synthetic model turn carrying a compaction summary
    pub fn summary(summary_text: &str) -> Self {
        Self::model(format!("{}{}", SUMMARY_PREFIX, summary_text))
    }

    /// Check if this turn was produced by compaction
    pub fn is_summary(&self) -> bool {
        self.role == Role::Model && self.text.starts_with(SUMMARY_PREFIX)
    }
}

/// Render turns as a `role: text` transcript, one turn per line
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_marker() {
        let turn = Turn::summary("Jane's password is fjord.");
        assert_eq!(turn.role, Role::Model);
        assert!(turn.is_summary());
        assert!(turn.text.ends_with("fjord."));

        assert!(!Turn::model("Regular reply").is_summary());
        // Marker text typed by the user is not a summary
        assert!(!Turn::user(format!("{}hi", SUMMARY_PREFIX)).is_summary());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::user("hello")).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn test_render_transcript() {
        let turns = vec![Turn::user("Hi"), Turn::model("Hello!")];
        assert_eq!(render_transcript(&turns), "user: Hi\nmodel: Hello!");
    }
}
