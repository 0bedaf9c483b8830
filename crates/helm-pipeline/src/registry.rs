//! Routing signals to running pipelines.
//!
//! A [`PipelineRegistry`] maps unit ids to live signal handles so operator
//! actions reach the right state machine. It is an explicit injected
//! object: whichever component boots pipelines owns one and passes it by
//! reference to anything that needs to route signals.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::PipelineError;
use crate::executor::{SnapshotSink, StageExecutor};
use crate::machine::{Pipeline, PipelineReport, PipelineSignal};

/// Signal capacity per pipeline. Operator signals are rare; a small buffer
/// absorbs bursts without letting a dead pipeline accumulate unbounded.
const SIGNAL_CAPACITY: usize = 8;

/// Live handle to one running pipeline's signal channel.
#[derive(Clone, Debug)]
pub struct PipelineHandle {
    signal_tx: mpsc::Sender<PipelineSignal>,
}

impl PipelineHandle {
    /// Deliver a signal without waiting. Returns `false` if the pipeline is
    /// gone or its buffer is full.
    pub fn signal(&self, signal: PipelineSignal) -> bool {
        self.signal_tx.try_send(signal).is_ok()
    }
}

/// Map of unit id to running pipeline instance.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: DashMap<String, PipelineHandle>,
}

impl PipelineRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline for `unit_id`, returning the receiver its run
    /// loop consumes. A previous registration for the same unit is replaced.
    pub fn register(&self, unit_id: &str) -> mpsc::Receiver<PipelineSignal> {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let _ = self
            .pipelines
            .insert(unit_id.to_string(), PipelineHandle { signal_tx });
        debug!(unit = unit_id, "pipeline registered");
        signal_rx
    }

    /// Remove the registration for `unit_id`.
    pub fn deregister(&self, unit_id: &str) {
        if self.pipelines.remove(unit_id).is_some() {
            debug!(unit = unit_id, "pipeline deregistered");
        }
    }

    /// Route a signal to the pipeline for `unit_id`. Returns `false` when no
    /// pipeline is registered or the signal could not be delivered.
    pub fn signal(&self, unit_id: &str, signal: PipelineSignal) -> bool {
        self.pipelines
            .get(unit_id)
            .is_some_and(|handle| handle.signal(signal))
    }

    /// Shorthand for routing an abort.
    pub fn abort(&self, unit_id: &str) -> bool {
        self.signal(unit_id, PipelineSignal::Abort)
    }

    /// Whether a pipeline is registered for `unit_id`.
    pub fn contains(&self, unit_id: &str) -> bool {
        self.pipelines.contains_key(unit_id)
    }

    /// Number of registered pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether no pipelines are registered.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Run a pipeline registered for signal routing, deregistering it once it
/// reaches a terminal state.
pub async fn run_registered(
    registry: &PipelineRegistry,
    pipeline: Pipeline,
    executor: Arc<dyn StageExecutor>,
    sink: Arc<dyn SnapshotSink>,
) -> Result<PipelineReport, PipelineError> {
    let unit_id = pipeline.unit_id().to_string();
    let signals = registry.register(&unit_id);
    let result = pipeline.run(executor, sink, signals).await;
    registry.deregister(&unit_id);
    result
}
