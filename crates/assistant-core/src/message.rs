//! Conversation Messages
//!
//! Standard message format and the bounded conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response, including injected tool output
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Default number of non-system messages kept after truncation.
pub const DEFAULT_HISTORY_BOUND: usize = 9;

/// Keep the leading system message plus the `bound` most recent entries.
///
/// Pure: the input is left untouched. When the first entry is not a system
/// message the result is simply the `bound` most recent entries.
pub fn truncate(messages: &[Message], bound: usize) -> Vec<Message> {
    match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => {
            let skip = rest.len().saturating_sub(bound);
            std::iter::once(first.clone())
                .chain(rest[skip..].iter().cloned())
                .collect()
        }
        _ => {
            let skip = messages.len().saturating_sub(bound);
            messages[skip..].to_vec()
        }
    }
}

/// Conversation history with a fixed eviction bound
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct History {
    messages: Vec<Message>,

    /// Maximum number of entries kept besides the system prompt
    #[serde(default = "default_bound")]
    bound: usize,
}

const fn default_bound() -> usize {
    DEFAULT_HISTORY_BOUND
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_BOUND)
    }
}

impl History {
    pub const fn new(bound: usize) -> Self {
        Self {
            messages: Vec::new(),
            bound,
        }
    }

    pub fn with_system_prompt(prompt: impl Into<String>, bound: usize) -> Self {
        let mut history = Self::new(bound);
        history.messages.push(Message::system(prompt));
        history
    }

    /// Append a message. Eviction happens in [`History::truncate`].
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub const fn bound(&self) -> usize {
        self.bound
    }

    /// Apply the eviction policy in place
    pub fn truncate(&mut self) {
        if self.messages.len() > self.bound + 1 {
            self.messages = truncate(&self.messages, self.bound);
        }
    }

    /// Clear all messages except the system prompt
    pub fn clear(&mut self) {
        self.messages.truncate(
            usize::from(self.messages.first().is_some_and(|m| m.role == Role::System)),
        );
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(history: &mut History, count: usize) {
        for i in 0..count {
            if i % 2 == 0 {
                history.push(Message::user(format!("q{i}")));
            } else {
                history.push(Message::assistant(format!("a{i}")));
            }
        }
    }

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_truncate_keeps_system_and_recent() {
        let mut history = History::with_system_prompt("You are helpful.", 4);
        numbered(&mut history, 10);
        history.truncate();

        assert_eq!(history.len(), 5);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.messages()[1].content, "q6");
        assert_eq!(history.last().unwrap().content, "a9");
    }

    #[test]
    fn test_truncate_is_pure() {
        let mut history = History::with_system_prompt("sys", 3);
        numbered(&mut history, 6);
        let before = history.messages().to_vec();

        let truncated = truncate(history.messages(), 3);

        assert_eq!(history.messages(), before.as_slice());
        assert_eq!(truncated.len(), 4);
    }

    #[test]
    fn test_truncate_bound_holds_for_all_sizes() {
        for bound in 0..6 {
            for count in 0..15 {
                let mut history = History::with_system_prompt("sys", bound);
                numbered(&mut history, count);
                history.truncate();
                assert!(history.len() <= bound + 1);
                assert_eq!(history.messages()[0].content, "sys");
            }
        }
    }

    #[test]
    fn test_truncate_without_system_prompt() {
        let mut history = History::new(2);
        numbered(&mut history, 5);
        history.truncate();
        let contents: Vec<_> = history.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a3", "q4"]);
    }

    #[test]
    fn test_clear_keeps_system_prompt() {
        let mut history = History::with_system_prompt("sys", 9);
        numbered(&mut history, 4);
        history.clear();
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::System);
    }
}
