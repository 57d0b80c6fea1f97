//! Conversation session and message history for chat turns.
//!
//! A `Conversation` is created once at startup (seeded with the system prompt) and passed
//! by `&mut` into each turn. History is append-only: messages are never edited or removed.

use serde::{Deserialize, Serialize};

/// System prompt used when the config does not set one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Ordered, append-only chat history for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    messages: Vec<ConversationMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl Conversation {
    /// Start a conversation whose only message is the given system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let id = format!("conv-{}", uuid::Uuid::new_v4());
        log::debug!("conversation {} created", id);
        Self {
            id,
            messages: vec![ConversationMessage::system(system_prompt)],
        }
    }

    /// Opaque id, used to correlate log lines.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All messages in chronological order, system prompt first.
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ConversationMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ConversationMessage::assistant(content));
    }

    /// Messages a user would see: everything except system prompts.
    pub fn visible_messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_holds_only_system_prompt() {
        let conv = Conversation::default();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[0].content, "You are a helpful assistant.");
        assert_eq!(conv.visible_messages().count(), 0);
    }

    #[test]
    fn appends_keep_chronological_order() {
        let mut conv = Conversation::new("be brief");
        conv.push_user("hi");
        conv.push_assistant("hello");
        conv.push_user("again");
        let roles: Vec<Role> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(conv.messages()[3].content, "again");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ConversationMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Conversation::default().id(), Conversation::default().id());
    }
}
