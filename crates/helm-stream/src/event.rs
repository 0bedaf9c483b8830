//! Streamed run events.

use serde::{Deserialize, Serialize};

use helm_core::{ContentBlock, TokenUsage};

/// Lifecycle state carried by a [`RunEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventState {
    /// Incremental content; more events follow.
    Delta,
    /// The run completed; the accumulated content is authoritative.
    Final,
    /// The run was stopped; accumulated content is partial but kept.
    Aborted,
    /// The run failed; accumulated content is discarded.
    Error,
}

/// Error body carried by a [`RunEventState::Error`] event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// One incremental protocol event for a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Remote-side sequence counter, for ordering and debugging only.
    pub seq: u64,
    /// Lifecycle state.
    pub state: RunEventState,
    /// Content blocks carried by this event.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message: Vec<ContentBlock>,
    /// Error body, present on `error` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Token usage, typically present on terminal events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl RunEvent {
    /// Build a delta event carrying incremental blocks.
    pub fn delta(run_id: impl Into<String>, seq: u64, message: Vec<ContentBlock>) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            state: RunEventState::Delta,
            message,
            error: None,
            usage: None,
        }
    }

    /// Build a final event closing the run.
    pub fn finished(run_id: impl Into<String>, seq: u64, usage: Option<TokenUsage>) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            state: RunEventState::Final,
            message: Vec::new(),
            error: None,
            usage,
        }
    }

    /// Build an aborted event.
    pub fn aborted(run_id: impl Into<String>, seq: u64) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            state: RunEventState::Aborted,
            message: Vec::new(),
            error: None,
            usage: None,
        }
    }

    /// Build an error event.
    pub fn failed(
        run_id: impl Into<String>,
        seq: u64,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            state: RunEventState::Error,
            message: Vec::new(),
            error: Some(RunError {
                code: code.into(),
                message: message.into(),
            }),
            usage: None,
        }
    }
}
