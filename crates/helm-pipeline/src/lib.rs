//! Pipeline orchestration.
//!
//! Sequences a unit of work through its configured stages with bounded
//! review retry, per-stage timeout, operator signals, abort, and a
//! persisted-snapshot contract that makes every pipeline resumable.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod executor;
pub mod machine;
pub mod registry;
pub mod state;

pub use config::PipelineConfig;
pub use errors::PipelineError;
pub use executor::{SnapshotSink, StageExecutor, StageOutcome, StageResult};
pub use machine::{
    ABORT_FEEDBACK, Pipeline, PipelineOutcome, PipelineReport, PipelineSignal, TIMEOUT_FEEDBACK,
};
pub use registry::{PipelineHandle, PipelineRegistry, run_registered};
pub use state::{DONE_STAGE, PipelineState, StageHistoryEntry, StageStatus};
