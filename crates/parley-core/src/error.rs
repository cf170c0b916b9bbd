//! Recoverable error types of the domain layer.
//!
//! Broken transcript invariants (ordering, role/kind pairing) are
//! programming errors and abort via panic instead of appearing here;
//! see `ConversationStore`.

use crate::message::MessageId;
use thiserror::Error;

/// Caller misuse detected before any state change or network traffic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The prompt was empty or whitespace-only.
    #[error("prompt is empty or whitespace-only")]
    Empty,
}

/// Recoverable conversation store failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No message with the given identifier exists in the transcript.
    #[error("message not found: '{0}'")]
    NotFound(MessageId),
}
