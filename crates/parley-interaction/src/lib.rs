//! Backend boundary for Parley.
//!
//! This crate owns everything that talks to the remote chat backend:
//!
//! - `transport`: the HTTP exchange itself (`Transport`, `HttpTransport`)
//! - `session`: authentication state and the anti-forgery token lifecycle
//!   (`SessionManager`)
//! - `config`: client-side connection configuration (`ClientConfig`)
//!
//! The domain layer (`parley-core`) never depends on this crate; the
//! application layer composes both.

pub mod config;
pub mod session;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use session::{AuthError, AuthStatus, Credentials, CsrfToken, Session, SessionManager};
pub use transport::{HttpTransport, Transport, TransportError, endpoints};
