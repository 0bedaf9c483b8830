//! Injected seams of the pipeline machine.
//!
//! The machine is agnostic to how stages actually run against remote
//! agents; callers inject a [`StageExecutor`] (typically built on the
//! gateway client) and a [`SnapshotSink`] that persists state transitions.

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::state::PipelineState;

/// Outcome status of one stage execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage succeeded.
    Passed,
    /// The stage failed; feedback explains why.
    Failed,
}

/// Result of executing one stage for one unit of work.
///
/// Failures are data, never errors: an executor that hits a transport
/// problem reports a failed result and the machine's evaluation logic takes
/// it from there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageResult {
    /// Whether the stage passed or failed.
    pub status: StageOutcome,
    /// Reference to the agent that ran the stage.
    pub agent_ref: String,
    /// Reference to the agent session used.
    pub session_ref: String,
    /// Failure feedback or reviewer notes.
    pub feedback: Option<String>,
}

impl StageResult {
    /// Build a passed result.
    pub fn passed(agent_ref: impl Into<String>, session_ref: impl Into<String>) -> Self {
        Self {
            status: StageOutcome::Passed,
            agent_ref: agent_ref.into(),
            session_ref: session_ref.into(),
            feedback: None,
        }
    }

    /// Build a failed result with feedback.
    pub fn failed(
        agent_ref: impl Into<String>,
        session_ref: impl Into<String>,
        feedback: impl Into<String>,
    ) -> Self {
        Self {
            status: StageOutcome::Failed,
            agent_ref: agent_ref.into(),
            session_ref: session_ref.into(),
            feedback: Some(feedback.into()),
        }
    }
}

/// Runs one stage for one unit of work.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Execute `stage` for `unit_id` to completion.
    async fn execute(&self, stage: &str, unit_id: &str) -> StageResult;
}

/// Persists pipeline snapshots.
///
/// The machine awaits `persist` before invoking the next stage execution,
/// so a successfully persisted snapshot is always at least as new as any
/// concurrently observable side effect of the pipeline.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Persist one state snapshot for `unit_id`.
    async fn persist(&self, unit_id: &str, state: &PipelineState) -> Result<(), PipelineError>;
}
