//! Connection lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the gateway connection.
///
/// `Disconnected → Connecting → Authenticating → Connected`; a transport
/// drop from `Connected` moves to `Reconnecting`, which restarts the
/// handshake. No RPC other than the handshake call itself is sent unless
/// the state is `Connected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport. Initial state, and terminal after `disconnect()` or an
    /// exhausted reconnect budget.
    Disconnected,
    /// Transport dial in progress.
    Connecting,
    /// Transport open, handshake in flight.
    Authenticating,
    /// Handshake complete; calls may be sent.
    Connected,
    /// Transport dropped after a completed handshake; dial + handshake
    /// restarting under the backoff policy.
    Reconnecting,
}

impl ConnectionState {
    /// Whether calls may be sent right now.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the connection may still become ready without a new
    /// `connect()` call.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}
