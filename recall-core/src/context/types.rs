//! Core context types: `Message`, `Role`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// User/human input
    User,
    /// Assistant/model response
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation history.
///
/// This is the wire shape a caller passes in when a query is given as a
/// conversation array rather than a bare string (spec §6): the orchestrator
/// extracts the latest `Role::User` message as the question and treats
/// everything before it as `conversation_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// When the message was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Additional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Message {
    /// Create a new message with just role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
            metadata: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message.
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Add metadata to the message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Get a metadata value.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref()?.get(key)
    }
}

/// Extract the question and conversation history from a list of messages,
/// per spec §6: the latest `Role::User` message is the question, everything
/// before it is history.
pub fn extract_question(messages: &[Message]) -> Option<(String, Vec<Message>)> {
    let idx = messages.iter().rposition(|m| m.role == Role::User)?;
    let question = messages[idx].content.clone();
    let history = messages[..idx].to_vec();
    Some((question, history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello, world!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, world!");
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn test_message_with_metadata() {
        let msg = Message::assistant("Response")
            .with_metadata("model", "claude-3-opus")
            .with_metadata("tokens", 150);

        assert_eq!(
            msg.get_metadata("model"),
            Some(&Value::String("claude-3-opus".into()))
        );
        assert_eq!(msg.get_metadata("tokens"), Some(&Value::Number(150.into())));
    }

    #[test]
    fn test_extract_question_takes_latest_user_turn() {
        let messages = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
        ];
        let (question, history) = extract_question(&messages).unwrap();
        assert_eq!(question, "second");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_extract_question_none_without_user_turn() {
        let messages = vec![Message::system("setup")];
        assert!(extract_question(&messages).is_none());
    }
}
