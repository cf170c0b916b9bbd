//! Transcript message types.
//!
//! This module contains types for representing messages in a conversation
//! transcript, including roles, origin kinds, and stable identifiers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
    /// System-generated message.
    System,
}

/// Records whether a transcript entry originated from a fresh send or from
/// a regeneration request.
///
/// This is a closed set: every site that inspects a message matches on it
/// exhaustively, so adding a kind is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Entry created by a fresh send.
    Normal,
    /// User entry that was re-sent through a regeneration request.
    RegenerateUser,
    /// Assistant entry whose content was replaced by a regeneration.
    RegenerateAssistant,
}

impl MessageKind {
    /// Returns `true` when this kind may be paired with the given role.
    ///
    /// The regenerate variants are role-specific; `Normal` applies to all.
    pub fn permits(self, role: MessageRole) -> bool {
        match self {
            MessageKind::Normal => true,
            MessageKind::RegenerateUser => role == MessageRole::User,
            MessageKind::RegenerateAssistant => role == MessageRole::Assistant,
        }
    }
}

/// Unique identifier of a transcript entry (UUID v4, string form).
///
/// Identifiers are stable across regeneration: replacing a message's
/// content in place never changes its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single message in the conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, stable across regeneration of the containing turn.
    pub id: MessageId,
    /// The role of the message sender.
    pub role: MessageRole,
    /// The text payload.
    pub content: String,
    /// How this entry came to be (fresh send or regeneration).
    pub kind: MessageKind,
    /// Timestamp when the message was created (ISO 8601 format).
    pub created_at: String,
}

impl Message {
    pub(crate) fn new(role: MessageRole, content: String, kind: MessageKind) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content,
            kind,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Whether role and kind are jointly consistent.
    pub fn is_consistent(&self) -> bool {
        self.kind.permits(self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_permits_roles() {
        assert!(MessageKind::Normal.permits(MessageRole::User));
        assert!(MessageKind::Normal.permits(MessageRole::Assistant));
        assert!(MessageKind::Normal.permits(MessageRole::System));

        assert!(MessageKind::RegenerateUser.permits(MessageRole::User));
        assert!(!MessageKind::RegenerateUser.permits(MessageRole::Assistant));

        assert!(MessageKind::RegenerateAssistant.permits(MessageRole::Assistant));
        assert!(!MessageKind::RegenerateAssistant.permits(MessageRole::User));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = Message::new(MessageRole::User, "hi".to_string(), MessageKind::Normal);
        let b = Message::new(MessageRole::User, "hi".to_string(), MessageKind::Normal);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_message_serializes_round_trip() {
        let message = Message::new(
            MessageRole::Assistant,
            "reply".to_string(),
            MessageKind::RegenerateAssistant,
        );
        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, back);
    }
}
