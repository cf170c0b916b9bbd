//! HTTP transport to the chat backend.
//!
//! A transport performs one bounded network exchange per call and
//! normalizes failures into [`TransportError`]. It carries no retry
//! policy; retries belong to the orchestrator.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::session::CsrfToken;

/// Backend endpoint paths, relative to the configured base URL.
pub mod endpoints {
    /// Prompt submission. Request `{"message": ...}`, response `{"response": ...}`.
    pub const CHAT: &str = "/api/gpt/chat/";
    /// Credential exchange. Request `{"email", "password"}`, response `{"ok": bool}`.
    pub const LOGIN: &str = "/api/auth/login/";
    /// Anti-forgery token fetch. Response `{"csrfToken": ...}`.
    pub const CSRF: &str = "/api/auth/csrf/";
}

/// Header carrying the anti-forgery token on mutating calls.
const CSRF_HEADER: &str = "X-CSRFToken";

/// Normalized transport-boundary failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection or timeout failure; the exchange never completed.
    #[error("network failure: {0}")]
    Network(String),
    /// The backend rejected the session credentials (401/403-class status).
    #[error("backend rejected session credentials (HTTP {status})")]
    AuthRejected { status: u16 },
    /// Any other non-2xx status, or a 2xx with a malformed body.
    #[error("bad backend response (HTTP {status}): {message}")]
    BadResponse { status: u16, message: String },
}

/// A single bounded network exchange with the backend.
///
/// Implementations attach the anti-forgery token when one is provided
/// (login and the token fetch itself go out without one).
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `payload` to `endpoint` and returns the parsed JSON body.
    async fn send(
        &self,
        endpoint: &str,
        payload: Value,
        token: Option<&CsrfToken>,
    ) -> Result<Value, TransportError>;
}

/// [`Transport`] implementation backed by a shared reqwest client.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for the given base URL with a per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when the underlying client
    /// cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: Value,
        token: Option<&CsrfToken>,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = self.client.post(&url).json(&payload);
        if let Some(token) = token {
            request = request.header(CSRF_HEADER, token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(%status, endpoint, "backend rejected session credentials");
            return Err(TransportError::AuthRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(TransportError::BadResponse {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        response.json().await.map_err(|err| TransportError::BadResponse {
            status: status.as_u16(),
            message: format!("malformed body: {err}"),
        })
    }
}

/// Pulls the `error` field out of the backend's JSON error bodies,
/// falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_message_prefers_error_field() {
        let body = r#"{"error": "Missing user_question."}"#;
        assert_eq!(extract_error_message(body), "Missing user_question.");
    }

    #[test]
    fn test_extract_error_message_falls_back_to_raw_text() {
        assert_eq!(extract_error_message("<html>gateway</html>"), "<html>gateway</html>");
        assert_eq!(extract_error_message(r#"{"detail": "nope"}"#), r#"{"detail": "nope"}"#);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let transport =
            HttpTransport::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url, "http://localhost:8000");
    }
}
