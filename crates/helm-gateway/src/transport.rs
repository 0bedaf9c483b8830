//! Transport seam.
//!
//! The client's handshake, correlation, and reconnect logic is written
//! against these traits rather than a concrete socket, so tests drive it
//! with an in-memory channel pair. Production uses [`crate::ws::WsDialer`].

use async_trait::async_trait;
use helm_core::{Frame, GatewayError};

/// One open, framed, bidirectional connection to the gateway.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame. Errors indicate the connection is unusable.
    async fn send(&mut self, frame: Frame) -> Result<(), GatewayError>;

    /// Receive the next frame.
    ///
    /// Returns `None` when the transport has closed. Malformed inbound data
    /// surfaces as `Some(Err(..))` and does not close the transport.
    async fn recv(&mut self) -> Option<Result<Frame, GatewayError>>;

    /// Close the transport. Idempotent.
    async fn close(&mut self);
}

/// Opens transports to an endpoint. One dial per (re)connection attempt.
#[async_trait]
pub trait TransportDialer: Send + Sync {
    /// Establish a new transport to `endpoint`.
    async fn dial(&self, endpoint: &str) -> Result<Box<dyn Transport>, GatewayError>;
}
