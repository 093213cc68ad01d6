//! Conversation history.
//!
//! The history is the ordered, append-only log that is replayed verbatim to
//! the completion service on every turn.

use std::fmt;

use serde::{Deserialize, Serialize};

/// System instruction used when the caller does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Author of a message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// The person at the keyboard.
    User,
    /// The model.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A role-tagged message.  Messages cannot be edited once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    /// Creates a message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Returns the author of the message.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the message text.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered log of the messages exchanged in this run.
///
/// Messages are only ever appended.  Nothing is de-duplicated, reordered, or
/// dropped, even once the token budget is exceeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    /// Creates a history seeded with [`DEFAULT_SYSTEM_PROMPT`].
    pub fn new() -> Self {
        Self::with_system_prompt(DEFAULT_SYSTEM_PROMPT)
    }

    /// Creates a history seeded with a caller-supplied system instruction.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    /// Appends a message at the end of the conversation.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    /// Returns the conversation in order.
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Returns an owned copy of the conversation for a request.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Returns the most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the number of messages, including the system instruction.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the number of messages with the given role.
    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_with_default_system_prompt() {
        let history = ConversationHistory::new();
        assert_eq!(history.len(), 1);
        assert_eq!(history.as_slice()[0], Message::system(DEFAULT_SYSTEM_PROMPT));
    }

    #[test]
    fn caller_supplied_system_prompt() {
        let history = ConversationHistory::with_system_prompt("Be terse.");
        assert_eq!(history.as_slice(), &[Message::system("Be terse.")]);
    }

    #[test]
    fn append_preserves_order_and_duplicates() {
        let mut history = ConversationHistory::new();
        history.append(Role::User, "hi");
        history.append(Role::Assistant, "hello");
        history.append(Role::User, "hi");
        history.append(Role::User, "");

        let contents: Vec<&str> = history.as_slice()[1..].iter().map(Message::content).collect();
        assert_eq!(contents, vec!["hi", "hello", "hi", ""]);
        assert_eq!(history.count_role(Role::User), 3);
        assert_eq!(history.last(), Some(&Message::user("")));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut history = ConversationHistory::new();
        history.append(Role::User, "first");
        let snapshot = history.snapshot();
        history.append(Role::Assistant, "second");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
