//! Pipeline error types.
//!
//! Stage failures are never errors here: they travel as
//! [`crate::executor::StageResult`] data and drive the evaluation logic.
//! These variants cover configuration and infrastructure problems only.

use thiserror::Error;

/// Errors surfaced by the pipeline machinery.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A pipeline was configured with no stages.
    #[error("pipeline has no stages")]
    EmptyStages,

    /// A persisted state referenced a stage missing from the configuration.
    #[error("stage `{0}` not present in configured stages")]
    UnknownStage(String),

    /// The snapshot sink failed to persist a state transition.
    #[error("snapshot persistence failed: {0}")]
    Snapshot(String),
}
