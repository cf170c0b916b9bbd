//! Prompt submission orchestration.
//!
//! `ChatOrchestrator` accepts user prompts, validates the session,
//! dispatches them through the transport, and commits results to the
//! conversation store. It serializes submissions: a second prompt issued
//! while one is in flight is rejected with [`ChatError::Busy`] instead of
//! interleaved, so two backend calls never race to mutate the transcript.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parley_core::{
    ConversationStore, Message, MessageId, MessageKind, MessageRole, StoreError, ValidationError,
};
use parley_interaction::{
    CsrfToken, SessionManager, Transport, TransportError, endpoints,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Orchestration-level outcome surfaced to the caller as data.
///
/// These never cross the UI boundary as panics or opaque strings; the
/// renderer collaborator turns them into user-visible fallbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Caller misuse, rejected before any state change or network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No authenticated session, and re-authentication was not possible.
    #[error("no authenticated session")]
    NotAuthenticated,
    /// The backend could not be reached or answered unusably.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A prompt is already in flight; resubmit once it settles.
    #[error("a prompt is already in flight")]
    Busy,
    /// The identifier names no user message in this conversation.
    #[error("message not found: '{0}'")]
    NotFound(MessageId),
}

/// Prompt-submission state of the orchestrator.
///
/// `Failed` is not terminal: any new submission re-attempts and moves
/// back through `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// No submission in flight.
    Idle,
    /// A submission is awaiting the backend.
    Sending,
    /// The last submission failed; the transcript keeps the user input.
    Failed,
}

/// A user turn targeted by a regeneration request.
struct Turn {
    user_id: MessageId,
    assistant_id: Option<MessageId>,
}

/// Composes session, transport, and conversation store into the prompt
/// state machine UI-level callers drive.
///
/// One orchestrator per chat view; the [`SessionManager`] behind it is
/// shared process-wide.
pub struct ChatOrchestrator {
    store: Mutex<ConversationStore>,
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    state: Mutex<ChatState>,
    /// Bumped by [`cancel_pending`](Self::cancel_pending); a completion
    /// carrying a stale epoch is discarded instead of committed.
    epoch: AtomicU64,
}

impl ChatOrchestrator {
    /// Creates an orchestrator over an empty conversation.
    pub fn new(session: Arc<SessionManager>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store: Mutex::new(ConversationStore::new()),
            session,
            transport,
            state: Mutex::new(ChatState::Idle),
            epoch: AtomicU64::new(0),
        }
    }

    /// Submits a user prompt to the backend.
    ///
    /// The user message is committed to the transcript synchronously,
    /// before any network traffic, and survives failed sends so the input
    /// is preserved for retry. On success the assistant reply is appended
    /// and its id returned. `Ok(None)` means the submission was cancelled
    /// while in flight and its completion discarded.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Validation`] for empty/whitespace-only prompts
    /// - [`ChatError::Busy`] while another submission is in flight
    /// - [`ChatError::NotAuthenticated`] when no session token can be
    ///   obtained, or re-authentication after a rejected send fails
    /// - [`ChatError::BackendUnavailable`] on network or bad-response
    ///   failures (no automatic retry)
    pub async fn submit_prompt(&self, text: &str) -> Result<Option<MessageId>, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty.into());
        }

        self.claim_sending().await?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        self.store
            .lock()
            .await
            .append(MessageRole::User, trimmed, MessageKind::Normal);

        let reply = self.send_prompt(trimmed).await;
        self.finish(epoch, reply, None).await
    }

    /// Re-sends the prompt text of the identified user message and
    /// reconciles the new reply into the existing turn.
    ///
    /// On success the corresponding assistant message is replaced in
    /// place (its id and position preserved) and the user message is
    /// marked as re-sent. A turn that never received a reply (an earlier
    /// failed send) gets the reply appended instead.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotFound`] when the id names no user message, plus
    /// everything [`submit_prompt`](Self::submit_prompt) can return
    /// except validation errors.
    pub async fn regenerate_prompt(&self, id: &MessageId) -> Result<Option<MessageId>, ChatError> {
        self.claim_sending().await?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let resolved = {
            let store = self.store.lock().await;
            match store.get(id) {
                Some(message) if message.role == MessageRole::User => Some((
                    message.content.clone(),
                    Turn {
                        user_id: id.clone(),
                        assistant_id: store.assistant_after(id).map(|reply| reply.id.clone()),
                    },
                )),
                _ => None,
            }
        };
        let Some((prompt, turn)) = resolved else {
            // Caller misuse, not a send failure: release the claim untouched.
            self.set_state(ChatState::Idle).await;
            return Err(ChatError::NotFound(id.clone()));
        };

        let reply = self.send_prompt(&prompt).await;
        self.finish(epoch, reply, Some(turn)).await
    }

    /// Read-only transcript view for renderer collaborators.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.store.lock().await.snapshot()
    }

    /// Current submission state.
    pub async fn state(&self) -> ChatState {
        *self.state.lock().await
    }

    /// Abandons any pending submission.
    ///
    /// The in-flight transport call is allowed to complete, but its
    /// completion carries a stale epoch and is discarded.
    pub fn cancel_pending(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    async fn claim_sending(&self) -> Result<(), ChatError> {
        let mut state = self.state.lock().await;
        if *state == ChatState::Sending {
            return Err(ChatError::Busy);
        }
        *state = ChatState::Sending;
        Ok(())
    }

    async fn set_state(&self, next: ChatState) {
        *self.state.lock().await = next;
    }

    /// Validates the session and runs the send, with exactly one
    /// re-authentication + retry when the backend rejects the token.
    async fn send_prompt(&self, text: &str) -> Result<String, ChatError> {
        let token = match self.session.ensure_token().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "prompt rejected before dispatch");
                return Err(ChatError::NotAuthenticated);
            }
        };

        match self.dispatch(text, &token).await {
            Ok(reply) => Ok(reply),
            Err(TransportError::AuthRejected { status }) => {
                tracing::warn!(status, "send rejected, re-authenticating once");
                self.session.invalidate().await;
                if self.session.reauthenticate().await.is_err() {
                    return Err(ChatError::NotAuthenticated);
                }
                let token = self
                    .session
                    .ensure_token()
                    .await
                    .map_err(|_| ChatError::NotAuthenticated)?;
                match self.dispatch(text, &token).await {
                    Ok(reply) => Ok(reply),
                    Err(TransportError::AuthRejected { .. }) => Err(ChatError::NotAuthenticated),
                    Err(err) => Err(ChatError::BackendUnavailable(err.to_string())),
                }
            }
            Err(err) => Err(ChatError::BackendUnavailable(err.to_string())),
        }
    }

    async fn dispatch(&self, text: &str, token: &CsrfToken) -> Result<String, TransportError> {
        let payload = serde_json::json!({ "message": text });
        let body = self
            .transport
            .send(endpoints::CHAT, payload, Some(token))
            .await?;
        body.get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TransportError::BadResponse {
                status: 200,
                message: "response text missing from chat body".to_string(),
            })
    }

    /// Commits a settled send: appends or reconciles the reply on
    /// success, records `Failed` on error, and discards completions whose
    /// epoch went stale while they were in flight.
    async fn finish(
        &self,
        epoch: u64,
        reply: Result<String, ChatError>,
        turn: Option<Turn>,
    ) -> Result<Option<MessageId>, ChatError> {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("discarding stale completion");
            self.set_state(ChatState::Idle).await;
            return Ok(None);
        }

        match reply {
            Ok(text) => {
                let committed = {
                    let mut store = self.store.lock().await;
                    match turn {
                        None => Ok(store.append(MessageRole::Assistant, text, MessageKind::Normal)),
                        Some(turn) => {
                            // Mark the user entry as re-sent; the id was
                            // resolved under the Sending claim, so it is
                            // still present.
                            if let Some(prompt) =
                                store.get(&turn.user_id).map(|m| m.content.clone())
                            {
                                let _ = store.regenerate(
                                    &turn.user_id,
                                    prompt,
                                    MessageKind::RegenerateUser,
                                );
                            }
                            match turn.assistant_id {
                                Some(assistant_id) => store
                                    .regenerate(
                                        &assistant_id,
                                        text,
                                        MessageKind::RegenerateAssistant,
                                    )
                                    .map(|()| assistant_id)
                                    .map_err(|StoreError::NotFound(missing)| {
                                        ChatError::NotFound(missing)
                                    }),
                                None => Ok(store.append(
                                    MessageRole::Assistant,
                                    text,
                                    MessageKind::RegenerateAssistant,
                                )),
                            }
                        }
                    }
                };
                match committed {
                    Ok(id) => {
                        self.set_state(ChatState::Idle).await;
                        Ok(Some(id))
                    }
                    Err(err) => {
                        self.set_state(ChatState::Failed).await;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.set_state(ChatState::Failed).await;
                Err(err)
            }
        }
    }
}
