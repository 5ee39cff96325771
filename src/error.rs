//! Session error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! - Connect-time failures (timeout, transport, auth rejection) reject the
//!   `connect()` future and leave the session in `error`.
//! - Server `error` frames are surfaced as lifecycle events, never as a
//!   `SessionError`.
//! - Unexpected disconnects go through the reconnect policy; callers only see
//!   `ReconnectExhausted` once it gives up.
//! - Malformed and unknown frames are logged and dropped by the router.

use std::time::Duration;

use crate::ack::AckError;
use crate::config::ConfigError;
use crate::transport::TransportError;

/// Grepable error code and retryable flag, surfaced in `Error` events.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("a connection attempt is already in progress")]
    ConnectInProgress,
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("socket closed during handshake (code {code})")]
    ClosedDuringHandshake { code: u16 },
    #[error("reconnect gave up after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("session was disconnected")]
    Disconnected,
    #[error("session task is no longer running")]
    SessionClosed,
    #[error("no tokio runtime is available to host the session task")]
    NoRuntime,
}

impl From<AckError> for SessionError {
    fn from(err: AckError) -> Self {
        match err {
            AckError::Rejected { message, .. } => Self::AuthRejected(message),
            AckError::Duplicate(_) | AckError::Cancelled { .. } => Self::Disconnected,
        }
    }
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "E_CONFIG",
            Self::ConnectInProgress => "E_CONNECT_IN_PROGRESS",
            Self::ConnectTimeout(_) => "E_CONNECT_TIMEOUT",
            Self::Transport(_) => "E_TRANSPORT",
            Self::AuthRejected(_) => "E_AUTH_REJECTED",
            Self::ClosedDuringHandshake { .. } => "E_HANDSHAKE_CLOSED",
            Self::ReconnectExhausted(_) => "E_RECONNECT_EXHAUSTED",
            Self::Disconnected => "E_DISCONNECTED",
            Self::SessionClosed => "E_SESSION_CLOSED",
            Self::NoRuntime => "E_NO_RUNTIME",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::Transport(_) | Self::ClosedDuringHandshake { .. }
        )
    }
}
