//! Session Management
//!
//! A session owns one conversation's bounded history. Sessions live in memory
//! for the duration of a conversation and are not persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{History, Message, Role};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history
    pub history: History,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create with system prompt and history bound
    pub fn new(system_prompt: impl Into<String>, history_bound: usize) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            history: History::with_system_prompt(system_prompt, history_bound),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with specific ID
    pub fn with_id(
        id: SessionId,
        system_prompt: impl Into<String>,
        history_bound: usize,
    ) -> Self {
        let mut session = Self::new(system_prompt, history_bound);
        session.id = id;
        session
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append a message and apply the history bound
    pub fn record(&mut self, message: Message) {
        self.history.push(message);
        self.history.truncate();
        self.touch();
    }

    /// Drop everything except the system prompt
    pub fn clear(&mut self) {
        self.history.clear();
        self.touch();
    }

    /// Get or generate title from the first user message
    pub fn title(&self) -> String {
        self.history
            .messages()
            .iter()
            .find(|m| m.role == Role::User)
            .map_or_else(
                || format!("Session {}", &self.id.0[..8.min(self.id.0.len())]),
                |m| {
                    let preview: String = m.content.chars().take(50).collect();
                    if m.content.chars().count() > 50 {
                        format!("{preview}...")
                    } else {
                        preview
                    }
                },
            )
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = Session::new("sys", 9);
        assert_eq!(session.message_count(), 1);
        assert!(session.title().starts_with("Session "));
    }

    #[test]
    fn test_record_applies_bound() {
        let mut session = Session::new("sys", 2);
        for i in 0..5 {
            session.record(Message::user(format!("m{i}")));
        }
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.history.messages()[0].role, Role::System);
        assert_eq!(session.history.last().unwrap().content, "m4");
    }

    #[test]
    fn test_title_from_first_user_message() {
        let mut session = Session::new("sys", 9);
        session.record(Message::user("How is my portfolio doing?"));
        assert_eq!(session.title(), "How is my portfolio doing?");
    }
}
