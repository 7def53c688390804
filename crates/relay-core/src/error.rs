//! Error types for the relay engine.

use thiserror::Error;

/// Handshake authentication errors.
///
/// This is the only error class that aborts an operation outright: a failed
/// verification terminates the connection attempt before any registry state
/// is created. Everything after the handshake is best-effort and contained.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credential failed verification (bad signature, malformed token)
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Credential was valid once but has expired
    #[error("credential expired")]
    ExpiredCredential,

    /// No credential presented and the deployment requires one
    #[error("missing credential")]
    MissingCredential,
}

/// Internal relay errors surfaced to the embedding server.
///
/// Per-recipient delivery failures are deliberately NOT represented here;
/// they are [`SendResult`](crate::registry::SendResult) values, logged and
/// isolated to the affected recipient. Nothing in the core is fatal to the
/// server process.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
