//! Session state and the anti-forgery token lifecycle.
//!
//! The process holds exactly one [`Session`]. It is created
//! unauthenticated, becomes authenticated through a login exchange, and
//! carries the anti-forgery token that must accompany every mutating
//! backend call. [`SessionManager`] owns that instance; callers share the
//! manager, never the raw session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::transport::{Transport, TransportError, endpoints};

/// Login credentials for the backend auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Opaque anti-forgery token required on all mutating backend calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Authentication status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthStatus {
    /// No valid credentials have been exchanged yet.
    Unauthenticated,
    /// A login exchange is in flight.
    Pending,
    /// The backend accepted the credentials.
    Authenticated,
}

/// The process-wide session singleton.
///
/// Owned by [`SessionManager`]; the manager hands out clones so callers
/// can inspect the state without holding the lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Current authentication status.
    pub status: AuthStatus,
    /// Anti-forgery token, populated once authenticated.
    pub token: Option<CsrfToken>,
    /// Credential expiry reported by the backend, when it reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a fresh, unauthenticated session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the backend-reported expiry has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            token: None,
            expires_at: None,
        }
    }
}

/// Session establishment and maintenance failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The backend rejected the provided credentials.
    #[error("backend rejected the provided credentials")]
    InvalidCredentials,
    /// The exchange could not be completed.
    #[error("authentication exchange failed: {0}")]
    NetworkFailure(String),
    /// No authenticated session exists.
    #[error("no authenticated session")]
    Unauthenticated,
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AuthRejected { .. } => AuthError::InvalidCredentials,
            other => AuthError::NetworkFailure(other.to_string()),
        }
    }
}

/// Owns the single process-wide [`Session`] and its credential lifecycle.
///
/// All operations mutate that one instance; no concurrent session exists.
/// Token fetches are serialized: at most one is outstanding at a time, and
/// callers arriving during a fetch reuse its result instead of issuing a
/// duplicate.
pub struct SessionManager {
    session: RwLock<Session>,
    transport: Arc<dyn Transport>,
    /// Credentials retained for the single re-authentication retry path.
    credentials: RwLock<Option<Credentials>>,
    /// Serializes token fetches; late arrivals re-check the cache after
    /// acquiring this.
    token_fetch: Mutex<()>,
}

impl SessionManager {
    /// Creates a manager owning the given session instance.
    ///
    /// The session is passed in explicitly (rather than sprung from
    /// ambient global state) so tests can run isolated sessions.
    pub fn new(session: Session, transport: Arc<dyn Transport>) -> Self {
        Self {
            session: RwLock::new(session),
            transport,
            credentials: RwLock::new(None),
            token_fetch: Mutex::new(()),
        }
    }

    /// Exchanges credentials for an authenticated session.
    ///
    /// On success the session becomes authenticated, the credentials are
    /// retained for re-authentication, and the anti-forgery token is
    /// populated.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] when the backend rejects them
    /// - [`AuthError::NetworkFailure`] when the exchange cannot complete
    pub async fn login(&self, credentials: Credentials) -> Result<Session, AuthError> {
        self.session.write().await.status = AuthStatus::Pending;

        let payload = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        let body = match self.transport.send(endpoints::LOGIN, payload, None).await {
            Ok(body) => body,
            Err(err) => {
                self.session.write().await.status = AuthStatus::Unauthenticated;
                return Err(AuthError::from(err));
            }
        };

        let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if !ok {
            tracing::warn!("login rejected by backend");
            self.session.write().await.status = AuthStatus::Unauthenticated;
            return Err(AuthError::InvalidCredentials);
        }

        let expires_at = body
            .get("expires_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc));

        {
            let mut session = self.session.write().await;
            session.status = AuthStatus::Authenticated;
            session.token = None;
            session.expires_at = expires_at;
        }
        *self.credentials.write().await = Some(credentials);

        // The login response does not carry the token; populate it now.
        self.ensure_token().await?;

        Ok(self.session.read().await.clone())
    }

    /// Returns the current anti-forgery token, fetching it lazily if absent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when no authenticated
    /// session exists (including an expired one), and
    /// [`AuthError::NetworkFailure`] when the fetch fails.
    pub async fn ensure_token(&self) -> Result<CsrfToken, AuthError> {
        {
            let session = self.session.read().await;
            if session.status != AuthStatus::Authenticated || session.is_expired(Utc::now()) {
                return Err(AuthError::Unauthenticated);
            }
            if let Some(token) = session.token.clone() {
                return Ok(token);
            }
        }

        // One outstanding fetch at a time; whoever waited here reuses the
        // token the fetch cached.
        let _guard = self.token_fetch.lock().await;
        if let Some(token) = self.session.read().await.token.clone() {
            return Ok(token);
        }

        let body = self
            .transport
            .send(endpoints::CSRF, serde_json::json!({}), None)
            .await?;
        let token = body
            .get("csrfToken")
            .and_then(Value::as_str)
            .map(CsrfToken::new)
            .ok_or_else(|| {
                AuthError::NetworkFailure("token missing from csrf response".to_string())
            })?;

        self.session.write().await.token = Some(token.clone());
        tracing::debug!("anti-forgery token refreshed");
        Ok(token)
    }

    /// Clears session state back to unauthenticated.
    ///
    /// Called on hard auth failure from the transport. Retained
    /// credentials survive so [`reauthenticate`](Self::reauthenticate)
    /// can run once.
    pub async fn invalidate(&self) {
        let mut session = self.session.write().await;
        session.status = AuthStatus::Unauthenticated;
        session.token = None;
        session.expires_at = None;
    }

    /// Re-runs the login exchange with the retained credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when no credentials were
    /// retained, otherwise whatever [`login`](Self::login) returns.
    pub async fn reauthenticate(&self) -> Result<(), AuthError> {
        let credentials = self
            .credentials
            .read()
            .await
            .clone()
            .ok_or(AuthError::Unauthenticated)?;
        self.login(credentials).await.map(|_| ())
    }

    /// Snapshot of the current session state.
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Current authentication status.
    pub async fn status(&self) -> AuthStatus {
        self.session.read().await.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    /// Transport double that scripts per-endpoint responses and records
    /// every endpoint hit.
    struct MockTransport {
        calls: StdMutex<Vec<String>>,
        login_ok: StdMutex<bool>,
        csrf_token: StdMutex<Option<String>>,
        csrf_gate: StdMutex<Option<Arc<Notify>>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                login_ok: StdMutex::new(true),
                csrf_token: StdMutex::new(Some("token-1".to_string())),
                csrf_gate: StdMutex::new(None),
            }
        }

        fn reject_login(&self) {
            *self.login_ok.lock().unwrap() = false;
        }

        /// Holds every subsequent token fetch until the returned handle
        /// is notified.
        fn gate_csrf(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.csrf_gate.lock().unwrap() = Some(gate.clone());
            gate
        }

        fn calls_to(&self, endpoint: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|hit| hit.as_str() == endpoint)
                .count()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            endpoint: &str,
            _payload: Value,
            _token: Option<&CsrfToken>,
        ) -> Result<Value, TransportError> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            match endpoint {
                endpoints::LOGIN => {
                    Ok(serde_json::json!({ "ok": *self.login_ok.lock().unwrap() }))
                }
                endpoints::CSRF => {
                    let gate = self.csrf_gate.lock().unwrap().clone();
                    if let Some(gate) = gate {
                        gate.notified().await;
                    }
                    match self.csrf_token.lock().unwrap().clone() {
                        Some(token) => Ok(serde_json::json!({ "csrfToken": token })),
                        None => Err(TransportError::Network("csrf unreachable".to_string())),
                    }
                }
                other => panic!("unexpected endpoint {other}"),
            }
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            email: "user@example.com".to_string(),
            password: "secret".to_string(),
        }
    }

    fn manager(transport: &Arc<MockTransport>) -> SessionManager {
        SessionManager::new(Session::new(), transport.clone() as Arc<dyn Transport>)
    }

    #[tokio::test]
    async fn test_login_authenticates_and_populates_token() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);

        let session = manager.login(credentials()).await.unwrap();

        assert_eq!(session.status, AuthStatus::Authenticated);
        assert_eq!(session.token, Some(CsrfToken::new("token-1")));
        assert_eq!(transport.calls_to(endpoints::LOGIN), 1);
        assert_eq!(transport.calls_to(endpoints::CSRF), 1);
    }

    #[tokio::test]
    async fn test_login_rejection_leaves_session_unauthenticated() {
        let transport = Arc::new(MockTransport::new());
        transport.reject_login();
        let manager = manager(&transport);

        let err = manager.login(credentials()).await.unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(manager.status().await, AuthStatus::Unauthenticated);
        assert_eq!(transport.calls_to(endpoints::CSRF), 0);
    }

    #[tokio::test]
    async fn test_ensure_token_without_session_fails() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);

        let err = manager.ensure_token().await.unwrap_err();

        assert_eq!(err, AuthError::Unauthenticated);
        assert_eq!(transport.calls_to(endpoints::CSRF), 0);
    }

    #[tokio::test]
    async fn test_ensure_token_reuses_cached_token() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);
        manager.login(credentials()).await.unwrap();

        let first = manager.ensure_token().await.unwrap();
        let second = manager.ensure_token().await.unwrap();

        assert_eq!(first, second);
        // Login already fetched it once; the two calls above add nothing.
        assert_eq!(transport.calls_to(endpoints::CSRF), 1);
    }

    #[tokio::test]
    async fn test_concurrent_token_fetches_collapse_into_one() {
        let transport = Arc::new(MockTransport::new());
        let gate = transport.gate_csrf();
        // Authenticated but token not yet fetched.
        let session = Session {
            status: AuthStatus::Authenticated,
            token: None,
            expires_at: None,
        };
        let manager = Arc::new(SessionManager::new(
            session,
            transport.clone() as Arc<dyn Transport>,
        ));

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.ensure_token().await }
        });
        let second = tokio::spawn({
            let manager = manager.clone();
            async move { manager.ensure_token().await }
        });

        // Wait until one caller is blocked inside the backend call, so the
        // other is queued behind it rather than finishing first.
        while transport.calls_to(endpoints::CSRF) == 0 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls_to(endpoints::CSRF), 1);
    }

    #[tokio::test]
    async fn test_invalidate_clears_token_and_forces_refetch() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);
        manager.login(credentials()).await.unwrap();

        manager.invalidate().await;
        assert_eq!(manager.status().await, AuthStatus::Unauthenticated);
        assert_eq!(
            manager.ensure_token().await.unwrap_err(),
            AuthError::Unauthenticated
        );

        manager.reauthenticate().await.unwrap();
        assert_eq!(manager.status().await, AuthStatus::Authenticated);
        assert_eq!(transport.calls_to(endpoints::LOGIN), 2);
        assert_eq!(transport.calls_to(endpoints::CSRF), 2);
    }

    #[tokio::test]
    async fn test_reauthenticate_without_stored_credentials_fails() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);

        let err = manager.reauthenticate().await.unwrap_err();

        assert_eq!(err, AuthError::Unauthenticated);
        assert_eq!(transport.calls_to(endpoints::LOGIN), 0);
    }

    #[tokio::test]
    async fn test_expired_session_requires_new_login() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(&transport);
        manager.login(credentials()).await.unwrap();

        // Force the expiry into the past.
        manager.session.write().await.expires_at =
            Some(Utc::now() - chrono::Duration::seconds(1));

        assert_eq!(
            manager.ensure_token().await.unwrap_err(),
            AuthError::Unauthenticated
        );
    }
}
