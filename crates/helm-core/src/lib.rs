//! # helm-core
//!
//! Foundation types for the Helm console core.
//!
//! This crate provides the shared vocabulary that all other Helm crates
//! depend on:
//!
//! - **Wire frames**: [`Frame`] request/response/event variants plus the
//!   handshake parameter and result types
//! - **Content blocks**: [`ContentBlock`] covering text, thinking, tool
//!   use/results as streamed by the gateway
//! - **Domain messages**: [`ThreadMessage`] as assembled for persistence
//!   and rendering
//! - **Errors**: [`GatewayError`] hierarchy via `thiserror`
//! - **Backoff**: [`BackoffPolicy`] for reconnect scheduling
//! - **IDs**: UUID v7 request/client id generation

#![deny(unsafe_code)]

pub mod content;
pub mod errors;
pub mod frames;
pub mod ids;
pub mod messages;
pub mod retry;

pub use content::ContentBlock;
pub use errors::{ConnectFailureKind, GatewayError};
pub use frames::{
    ConnectChallenge, ConnectParams, Frame, GatewayFeatures, HandshakeResult, RemoteErrorBody,
};
pub use messages::{MessagePart, ThreadMessage, TokenUsage, ToolCallStatus};
pub use retry::BackoffPolicy;
