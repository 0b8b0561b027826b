//! Top-level server error type.

use std::fmt;

use crate::matcher::MatchError;

/// Errors surfaced at the binary-facing layer: startup, transport, and
/// wrapped failures from the Matcher/Session Controller layers.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad CLI flags, etc.).
    /// Fatal for startup.
    Config(String),

    /// Transport/network error (bind failure, WebSocket I/O error).
    Transport(String),

    /// A client violated the wire protocol (malformed JSON, missing
    /// field). Fatal for that connection, not for the server.
    Protocol(String),

    /// Matcher-layer failure (store timeout, contract violation).
    Match(MatchError),

    /// A session-controller invariant was violated. Logs and terminates
    /// the connection, never the process.
    Session(signal_core::SessionError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Match(err) => write!(f, "matcher error: {err}"),
            Self::Session(err) => write!(f, "session error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Match(err) => Some(err),
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MatchError> for ServerError {
    fn from(err: MatchError) -> Self {
        Self::Match(err)
    }
}

impl From<signal_core::SessionError> for ServerError {
    fn from(err: signal_core::SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
