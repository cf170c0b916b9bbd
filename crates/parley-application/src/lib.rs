//! Application layer for Parley.
//!
//! Composes the domain layer (`parley-core`) with the backend boundary
//! (`parley-interaction`) into the chat orchestrator that UI-level
//! callers drive.

pub mod orchestrator;

pub use orchestrator::{ChatError, ChatOrchestrator, ChatState};
