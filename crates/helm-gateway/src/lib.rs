//! # helm-gateway
//!
//! Connection manager for the gateway wire protocol.
//!
//! Owns one logical transport per client, performs the
//! challenge → connect handshake, correlates requests to responses,
//! dispatches inbound events to subscribers, and reconnects with bounded
//! backoff after a drop.
//!
//! The "requests are gated until connected" invariant is structural: calls
//! await a [`ConnectionState`] watch channel that only reads `Connected`
//! after a completed handshake, and is re-armed on every drop.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod state;
pub mod transport;
pub mod ws;

pub use client::{GatewayClient, Subscription};
pub use config::GatewayConfig;
pub use state::ConnectionState;
pub use transport::{Transport, TransportDialer};
pub use ws::WsDialer;
