//! Domain layer for Parley.
//!
//! This crate contains the pure, transport-agnostic chat domain:
//! transcript messages, the conversation store, and the recoverable
//! error types the upper layers build on. Nothing here performs I/O.

pub mod conversation;
pub mod error;
pub mod message;

pub use conversation::ConversationStore;
pub use error::{StoreError, ValidationError};
pub use message::{Message, MessageId, MessageKind, MessageRole};
