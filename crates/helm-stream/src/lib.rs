//! Streaming message accumulation.
//!
//! Converts the gateway's incremental run events into the structured
//! [`helm_core::ThreadMessage`] list used for persistence and rendering,
//! with an interim in-memory view available while a run is in progress.

#![deny(unsafe_code)]

pub mod accumulator;
pub mod assemble;
pub mod event;

pub use accumulator::{RunAccumulator, RunDirectory};
pub use assemble::{CompletedRun, thread_messages_from_blocks, thread_messages_from_history};
pub use event::{RunError, RunEvent, RunEventState};
