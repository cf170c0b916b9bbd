//! Ordered conversation transcript and its mutation operations.
//!
//! `ConversationStore` is the single source of truth renderers read.
//! It is pure in-memory state; callers mutate it exclusively through
//! `append` and `regenerate`, and read it through `snapshot`.

use crate::error::StoreError;
use crate::message::{Message, MessageId, MessageKind, MessageRole};

/// Owns the ordered transcript of a single conversation.
///
/// Insertion order is chronological turn order. Two invariants are
/// re-validated after every mutation, and a violation aborts (it means
/// a caller bypassed the contract, not a user-facing condition):
///
/// - every message's role and kind are jointly consistent
/// - an assistant message never precedes the first user message
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message at the tail and returns its fresh identifier.
    ///
    /// Pure in-memory append; never fails. The caller guarantees a
    /// well-formed role/kind pairing.
    pub fn append(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> MessageId {
        let message = Message::new(role, content.into(), kind);
        let id = message.id.clone();
        self.messages.push(message);
        self.check_invariants();
        id
    }

    /// Replaces a message's content in place, preserving its position and
    /// identifier, and updates its kind to the given regenerate variant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no message carries the
    /// identifier.
    pub fn regenerate(
        &mut self,
        id: &MessageId,
        new_content: impl Into<String>,
        kind: MessageKind,
    ) -> Result<(), StoreError> {
        let message = self
            .messages
            .iter_mut()
            .find(|message| &message.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        message.content = new_content.into();
        message.kind = kind;
        self.check_invariants();
        Ok(())
    }

    /// Read-only view for renderers: a defensive copy of the transcript
    /// in insertion order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Looks up a message by identifier.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == id)
    }

    /// Returns the assistant reply belonging to the turn opened by the
    /// given user message: the first assistant entry after it, before the
    /// next user entry.
    pub fn assistant_after(&self, id: &MessageId) -> Option<&Message> {
        let position = self.messages.iter().position(|message| &message.id == id)?;
        self.messages[position + 1..]
            .iter()
            .take_while(|message| message.role != MessageRole::User)
            .find(|message| message.role == MessageRole::Assistant)
    }

    /// Number of messages in the transcript.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn check_invariants(&self) {
        let mut seen_user = false;
        for message in &self.messages {
            assert!(
                message.is_consistent(),
                "role/kind mismatch on message {}: {:?} tagged {:?}",
                message.id,
                message.role,
                message.kind
            );
            match message.role {
                MessageRole::User => seen_user = true,
                MessageRole::Assistant => {
                    assert!(
                        seen_user,
                        "assistant message {} precedes any user message",
                        message.id
                    );
                }
                MessageRole::System => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(store: &mut ConversationStore, content: &str) -> MessageId {
        store.append(MessageRole::User, content, MessageKind::Normal)
    }

    fn assistant(store: &mut ConversationStore, content: &str) -> MessageId {
        store.append(MessageRole::Assistant, content, MessageKind::Normal)
    }

    #[test]
    fn test_append_preserves_insertion_order() {
        let mut store = ConversationStore::new();
        user(&mut store, "one");
        assistant(&mut store, "two");
        user(&mut store, "three");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 3);
        let contents: Vec<&str> = snapshot.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_snapshot_is_a_defensive_copy() {
        let mut store = ConversationStore::new();
        user(&mut store, "hello");

        let mut snapshot = store.snapshot();
        snapshot[0].content = "mutated".to_string();
        snapshot.clear();

        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].content, "hello");
    }

    #[test]
    fn test_regenerate_preserves_position_and_id() {
        let mut store = ConversationStore::new();
        let user_id = user(&mut store, "question");
        let assistant_id = assistant(&mut store, "first answer");
        user(&mut store, "followup");

        store
            .regenerate(&assistant_id, "second answer", MessageKind::RegenerateAssistant)
            .unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].id, user_id);
        assert_eq!(snapshot[1].id, assistant_id);
        assert_eq!(snapshot[1].content, "second answer");
        assert_eq!(snapshot[1].kind, MessageKind::RegenerateAssistant);
    }

    #[test]
    fn test_regenerate_unknown_id_is_not_found() {
        let mut store = ConversationStore::new();
        user(&mut store, "question");

        let mut other = ConversationStore::new();
        let foreign_id = user(&mut other, "elsewhere");

        let result = store.regenerate(&foreign_id, "text", MessageKind::RegenerateUser);
        assert_eq!(result, Err(StoreError::NotFound(foreign_id)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_assistant_after_finds_the_turn_reply() {
        let mut store = ConversationStore::new();
        let first_user = user(&mut store, "q1");
        let first_reply = assistant(&mut store, "a1");
        let second_user = user(&mut store, "q2");
        let second_reply = assistant(&mut store, "a2");

        assert_eq!(store.assistant_after(&first_user).unwrap().id, first_reply);
        assert_eq!(store.assistant_after(&second_user).unwrap().id, second_reply);
    }

    #[test]
    fn test_assistant_after_is_none_for_unanswered_turn() {
        let mut store = ConversationStore::new();
        user(&mut store, "q1");
        assistant(&mut store, "a1");
        let unanswered = user(&mut store, "q2");

        assert!(store.assistant_after(&unanswered).is_none());
    }

    #[test]
    #[should_panic(expected = "precedes any user message")]
    fn test_assistant_before_user_aborts() {
        let mut store = ConversationStore::new();
        assistant(&mut store, "uninvited");
    }

    #[test]
    #[should_panic(expected = "role/kind mismatch")]
    fn test_role_kind_mismatch_aborts() {
        let mut store = ConversationStore::new();
        store.append(MessageRole::User, "q", MessageKind::RegenerateAssistant);
    }
}
