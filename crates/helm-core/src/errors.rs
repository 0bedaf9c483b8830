//! Error types for the gateway connection.
//!
//! Transport-level failures never crash the process: they resolve or reject
//! the specific pending call, and connection drops reject every pending call
//! so callers observe failure promptly and may retry at the application
//! layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified cause of a terminal connect failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectFailureKind {
    /// Transport could not be established.
    Unreachable,
    /// Gateway rejected the credentials.
    AuthRejected,
    /// No protocol version overlap with the gateway.
    ProtocolMismatch,
}

impl fmt::Display for ConnectFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreachable => "unreachable",
            Self::AuthRejected => "auth_rejected",
            Self::ProtocolMismatch => "protocol_mismatch",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the gateway connection manager.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GatewayError {
    /// Gateway rejected the connect call. Fatal for that attempt.
    #[error("handshake rejected [{code}]: {message}")]
    Handshake {
        /// Machine-readable rejection code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// No response within the deadline. Retryable by the caller.
    #[error("{context} timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that elapsed.
        timeout_ms: u64,
        /// What was being waited on.
        context: String,
    },

    /// Call attempted with no live connection. Caller must connect first.
    #[error("not connected to gateway")]
    NotConnected,

    /// In-flight call invalidated by a voluntary or involuntary disconnect.
    #[error("connection lost")]
    Disconnected,

    /// Gateway explicitly returned `ok: false`.
    #[error("remote error [{code}]: {message}")]
    Remote {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Transport-level failure (socket error, malformed frame).
    #[error("transport error: {0}")]
    Transport(String),

    /// Reconnect budget exhausted; no further automatic reconnection.
    #[error("connect failed ({kind}): {message}")]
    ConnectFailed {
        /// Classified cause.
        kind: ConnectFailureKind,
        /// Human-readable message.
        message: String,
    },
}

impl GatewayError {
    /// Build a [`GatewayError::Remote`] from a response error body.
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether a caller may usefully retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Disconnected)
    }
}
