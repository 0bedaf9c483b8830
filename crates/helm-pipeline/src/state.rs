//! Persisted pipeline state.
//!
//! [`PipelineState`] is the snapshot emitted on every transition and the
//! form a pipeline resumes from after a process restart. It is mutated only
//! by the machine's own transitions; external callers signal, never write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel value of [`PipelineState::current_stage`] once all stages passed.
pub const DONE_STAGE: &str = "done";

/// Outcome of one stage attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Passed,
    /// Completed unsuccessfully.
    Failed,
    /// Skipped by operator signal.
    Skipped,
}

/// One attempt of one stage, appended to the history on start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageHistoryEntry {
    /// Stage name.
    pub stage: String,
    /// Outcome of this attempt.
    pub status: StageStatus,
    /// When this attempt started.
    pub started_at: DateTime<Utc>,
    /// When this attempt finished, once it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// How many prior attempts of this stage precede this one.
    pub retry_count: u32,
    /// Failure feedback or operator note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl StageHistoryEntry {
    /// Open a new running attempt.
    pub fn running(stage: impl Into<String>, retry_count: u32) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            retry_count,
            feedback: None,
        }
    }

    /// Close this attempt with an outcome.
    pub fn complete(&mut self, status: StageStatus, feedback: Option<String>) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.feedback = feedback;
    }
}

/// Snapshot of one pipeline's progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// The template this pipeline was created from.
    pub template_id: String,
    /// Stage currently in play, or [`DONE_STAGE`] once terminal.
    pub current_stage: String,
    /// Every stage attempt, in order.
    pub stage_history: Vec<StageHistoryEntry>,
}

impl PipelineState {
    /// Fresh state for a pipeline that has not run its first stage yet.
    pub fn new(template_id: impl Into<String>, first_stage: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            current_stage: first_stage.into(),
            stage_history: Vec::new(),
        }
    }

    /// Whether the pipeline finished all stages. Terminal and immutable.
    pub fn is_done(&self) -> bool {
        self.current_stage == DONE_STAGE
    }

    /// Entries for one stage, in attempt order.
    pub fn attempts_of(&self, stage: &str) -> Vec<&StageHistoryEntry> {
        self.stage_history
            .iter()
            .filter(|e| e.stage == stage)
            .collect()
    }
}
