//! The pipeline state machine.
//!
//! Stages execute strictly sequentially. After each execution the result is
//! evaluated in priority order: a rejected review rewinds to the
//! implementation stage while retries remain, any other failure parks in a
//! stable failed state awaiting an operator signal, otherwise the pipeline
//! advances or finishes. Every transition snapshots through the
//! [`SnapshotSink`] before the machine proceeds, so resumption after a
//! restart never observes a half-applied transition.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::executor::{SnapshotSink, StageExecutor, StageOutcome, StageResult};
use crate::state::{DONE_STAGE, PipelineState, StageHistoryEntry, StageStatus};

/// Feedback recorded when a stage exceeds its wall-clock budget.
pub const TIMEOUT_FEEDBACK: &str = "Stage timed out";

/// Feedback recorded on the running entry when a pipeline is aborted.
pub const ABORT_FEEDBACK: &str = "Pipeline aborted";

/// External signal routed to a running pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineSignal {
    /// Mark the failed stage as completed out-of-band and advance.
    StageComplete,
    /// Skip the failed stage and advance.
    SkipStage,
    /// Re-execute the failed stage.
    Retry,
    /// Terminate the pipeline.
    Abort,
}

/// How a pipeline ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// All stages completed.
    Done,
    /// Terminated by an abort signal.
    Aborted,
}

/// Final result of a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    /// How the pipeline ended.
    pub outcome: PipelineOutcome,
    /// The final persisted state.
    pub state: PipelineState,
}

/// Outcome of racing one stage execution against its timeout and signals.
enum Exec {
    Finished(StageResult),
    TimedOut,
    Aborted,
}

/// What to do after handling a failed stage.
enum Flow {
    Continue,
    Terminate,
}

/// One pipeline instance for one unit of work.
#[derive(Debug)]
pub struct Pipeline {
    unit_id: String,
    config: PipelineConfig,
    state: PipelineState,
    stage_index: usize,
    review_retries: u32,
}

impl Pipeline {
    /// Create a fresh pipeline positioned at the first stage.
    pub fn new(unit_id: impl Into<String>, config: PipelineConfig) -> Result<Self, PipelineError> {
        let Some(first) = config.stages.first() else {
            return Err(PipelineError::EmptyStages);
        };
        let state = PipelineState::new(config.template_id.clone(), first.clone());
        Ok(Self {
            unit_id: unit_id.into(),
            config,
            state,
            stage_index: 0,
            review_retries: 0,
        })
    }

    /// Rebuild a pipeline from a persisted snapshot.
    ///
    /// Entries left in `running` are dropped: that stage's outcome is
    /// unknown after a restart and it must re-execute rather than be
    /// treated as silently succeeded. New history merges onto the old.
    pub fn resume(
        unit_id: impl Into<String>,
        persisted: PipelineState,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if config.stages.is_empty() {
            return Err(PipelineError::EmptyStages);
        }
        let PipelineState {
            template_id,
            current_stage,
            stage_history,
        } = persisted;
        let history: Vec<StageHistoryEntry> = stage_history
            .into_iter()
            .filter(|e| e.status != StageStatus::Running)
            .collect();
        let stage_index = if current_stage == DONE_STAGE {
            config.stages.len()
        } else {
            config
                .stages
                .iter()
                .position(|s| *s == current_stage)
                .ok_or_else(|| PipelineError::UnknownStage(current_stage.clone()))?
        };
        let review_retries = history
            .iter()
            .filter(|e| e.stage == config.review_stage && e.status == StageStatus::Failed)
            .count()
            .min(config.max_review_retries as usize) as u32;
        Ok(Self {
            unit_id: unit_id.into(),
            config,
            state: PipelineState {
                template_id,
                current_stage,
                stage_history: history,
            },
            stage_index,
            review_retries,
        })
    }

    /// The unit of work this pipeline orchestrates.
    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    /// Current state snapshot.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Drive the pipeline to a terminal state.
    ///
    /// Aborting does not cancel remote work an executor already started; it
    /// stops the machine from progressing and discards any in-flight result.
    #[tracing::instrument(skip_all, fields(unit = %self.unit_id, template = %self.config.template_id))]
    pub async fn run(
        mut self,
        executor: Arc<dyn StageExecutor>,
        sink: Arc<dyn SnapshotSink>,
        mut signals: mpsc::Receiver<PipelineSignal>,
    ) -> Result<PipelineReport, PipelineError> {
        let mut signals_closed = false;
        info!(stages = self.config.stages.len(), "pipeline running");
        loop {
            if self.stage_index >= self.config.stages.len() {
                self.state.current_stage = DONE_STAGE.to_string();
                self.snapshot(&*sink).await?;
                info!("pipeline done");
                return Ok(self.report(PipelineOutcome::Done));
            }

            let stage = self.config.stages[self.stage_index].clone();
            self.state.current_stage = stage.clone();
            let retry_count = self.state.attempts_of(&stage).len() as u32;
            self.state
                .stage_history
                .push(StageHistoryEntry::running(&stage, retry_count));
            self.snapshot(&*sink).await?;
            debug!(stage, retry_count, "stage executing");

            match self
                .execute_stage(&*executor, &stage, &mut signals, &mut signals_closed)
                .await
            {
                Exec::Aborted => {
                    self.close_current(StageStatus::Failed, Some(ABORT_FEEDBACK.to_string()));
                    self.snapshot(&*sink).await?;
                    info!(stage, "pipeline aborted");
                    return Ok(self.report(PipelineOutcome::Aborted));
                }
                Exec::TimedOut => {
                    warn!(stage, timeout_ms = self.config.stage_timeout_ms, "stage timed out");
                    self.close_current(StageStatus::Failed, Some(TIMEOUT_FEEDBACK.to_string()));
                    self.snapshot(&*sink).await?;
                    // Timeouts park directly in the failed stable state; the
                    // review-retry branch applies only to actual rejections.
                    match self
                        .stage_failed(&mut signals, &mut signals_closed, &*sink)
                        .await?
                    {
                        Flow::Continue => {}
                        Flow::Terminate => return Ok(self.report(PipelineOutcome::Aborted)),
                    }
                }
                Exec::Finished(result) => {
                    let flow = self
                        .evaluate(&stage, result, &mut signals, &mut signals_closed, &*sink)
                        .await?;
                    match flow {
                        Flow::Continue => {}
                        Flow::Terminate => return Ok(self.report(PipelineOutcome::Aborted)),
                    }
                }
            }
        }
    }

    /// Apply the stage-completion evaluation rules, in priority order.
    async fn evaluate(
        &mut self,
        stage: &str,
        result: StageResult,
        signals: &mut mpsc::Receiver<PipelineSignal>,
        signals_closed: &mut bool,
        sink: &dyn SnapshotSink,
    ) -> Result<Flow, PipelineError> {
        let failed = result.status == StageOutcome::Failed;

        // 1. Review rejection with retries left rewinds to implementation.
        if failed && stage == self.config.review_stage && self.review_retries < self.config.max_review_retries {
            if let Some(implement_index) = self
                .config
                .stages
                .iter()
                .position(|s| *s == self.config.implement_stage)
            {
                self.close_current(StageStatus::Failed, result.feedback);
                self.review_retries += 1;
                self.stage_index = implement_index;
                self.snapshot(sink).await?;
                info!(
                    retries = self.review_retries,
                    "review rejected; rewinding to implementation"
                );
                return Ok(Flow::Continue);
            }
            // No implementation stage configured to rewind to.
            warn!(
                implement_stage = %self.config.implement_stage,
                "review rejected but rewind target is not in the stage list"
            );
        }

        // 2. Any other failure parks until an operator signal.
        if failed {
            self.close_current(StageStatus::Failed, result.feedback);
            self.snapshot(sink).await?;
            return self.stage_failed(signals, signals_closed, sink).await;
        }

        // 3./4. Advance, or finish if this was the last stage.
        self.close_current(StageStatus::Passed, result.feedback);
        self.advance();
        self.snapshot(sink).await?;
        Ok(Flow::Continue)
    }

    /// Race the stage execution against its timeout and the signal channel.
    async fn execute_stage(
        &self,
        executor: &dyn StageExecutor,
        stage: &str,
        signals: &mut mpsc::Receiver<PipelineSignal>,
        signals_closed: &mut bool,
    ) -> Exec {
        let exec = executor.execute(stage, &self.unit_id);
        tokio::pin!(exec);
        let timeout = sleep(self.config.stage_timeout());
        tokio::pin!(timeout);
        loop {
            tokio::select! {
                result = &mut exec => return Exec::Finished(result),
                () = &mut timeout => return Exec::TimedOut,
                signal = signals.recv(), if !*signals_closed => match signal {
                    None => *signals_closed = true,
                    Some(PipelineSignal::Abort) => return Exec::Aborted,
                    Some(ignored) => {
                        warn!(stage, ?ignored, "signal ignored while stage is executing");
                    }
                },
            }
        }
    }

    /// Stable failed state: wait for an operator decision.
    async fn stage_failed(
        &mut self,
        signals: &mut mpsc::Receiver<PipelineSignal>,
        signals_closed: &mut bool,
        sink: &dyn SnapshotSink,
    ) -> Result<Flow, PipelineError> {
        info!(stage = %self.state.current_stage, "stage failed; awaiting signal");
        loop {
            if *signals_closed {
                // Nothing can ever unpark this pipeline.
                warn!("signal channel closed while stage failed; terminating");
                return Ok(Flow::Terminate);
            }
            match signals.recv().await {
                None => *signals_closed = true,
                Some(PipelineSignal::Abort) => return Ok(Flow::Terminate),
                Some(PipelineSignal::Retry) => return Ok(Flow::Continue),
                Some(PipelineSignal::StageComplete) => {
                    self.override_last(StageStatus::Passed);
                    self.advance();
                    self.snapshot(sink).await?;
                    return Ok(Flow::Continue);
                }
                Some(PipelineSignal::SkipStage) => {
                    self.override_last(StageStatus::Skipped);
                    self.advance();
                    self.snapshot(sink).await?;
                    return Ok(Flow::Continue);
                }
            }
        }
    }

    /// Move to the next stage; entering a non-review stage resets the
    /// review retry budget.
    fn advance(&mut self) {
        self.stage_index += 1;
        if let Some(next) = self.config.stages.get(self.stage_index)
            && *next != self.config.review_stage
        {
            self.review_retries = 0;
        }
    }

    fn close_current(&mut self, status: StageStatus, feedback: Option<String>) {
        if let Some(entry) = self.state.stage_history.last_mut() {
            entry.complete(status, feedback);
        }
    }

    /// Operator override of the most recent (already closed) attempt.
    fn override_last(&mut self, status: StageStatus) {
        if let Some(entry) = self.state.stage_history.last_mut() {
            entry.status = status;
        }
    }

    async fn snapshot(&self, sink: &dyn SnapshotSink) -> Result<(), PipelineError> {
        sink.persist(&self.unit_id, &self.state).await
    }

    fn report(self, outcome: PipelineOutcome) -> PipelineReport {
        PipelineReport {
            outcome,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Executor that pops scripted results, recording the call order.
    #[derive(Default)]
    struct ScriptedExecutor {
        results: Mutex<VecDeque<StageResult>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn passing() -> Self {
            Self::default()
        }

        fn with_results(results: Vec<StageResult>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl StageExecutor for ScriptedExecutor {
        async fn execute(&self, stage: &str, _unit_id: &str) -> StageResult {
            self.calls.lock().push(stage.to_string());
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| StageResult::passed("agent_1", "sess_1"))
        }
    }

    /// Executor that rejects the review stage a fixed number of times.
    struct ReviewRejectingExecutor {
        rejections_left: Mutex<u32>,
        calls: Mutex<Vec<String>>,
    }

    impl ReviewRejectingExecutor {
        fn new(rejections: u32) -> Self {
            Self {
                rejections_left: Mutex::new(rejections),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StageExecutor for ReviewRejectingExecutor {
        async fn execute(&self, stage: &str, _unit_id: &str) -> StageResult {
            self.calls.lock().push(stage.to_string());
            if stage == "review" {
                let mut left = self.rejections_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return StageResult::failed("agent_1", "sess_1", "needs work");
                }
            }
            StageResult::passed("agent_1", "sess_1")
        }
    }

    /// Executor that never completes.
    struct HangingExecutor;

    #[async_trait]
    impl StageExecutor for HangingExecutor {
        async fn execute(&self, _stage: &str, _unit_id: &str) -> StageResult {
            std::future::pending().await
        }
    }

    /// Sink that records every snapshot.
    #[derive(Default)]
    struct MemorySink {
        snapshots: Mutex<Vec<PipelineState>>,
    }

    impl MemorySink {
        fn snapshots(&self) -> Vec<PipelineState> {
            self.snapshots.lock().clone()
        }
    }

    #[async_trait]
    impl SnapshotSink for MemorySink {
        async fn persist(&self, _unit_id: &str, state: &PipelineState) -> Result<(), PipelineError> {
            self.snapshots.lock().push(state.clone());
            Ok(())
        }
    }

    fn stages(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn all_stages_pass_reaches_done() {
        let executor = Arc::new(ScriptedExecutor::passing());
        let sink = Arc::new(MemorySink::default());
        let (_tx, rx) = mpsc::channel(8);
        let pipeline = Pipeline::new(
            "unit_1",
            PipelineConfig::new("tmpl_1", stages(&["implement", "test", "ci"])),
        )
        .unwrap();

        let report = pipeline.run(executor.clone(), sink.clone(), rx).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Done);
        assert!(report.state.is_done());
        assert_eq!(report.state.stage_history.len(), 3);
        assert!(
            report
                .state
                .stage_history
                .iter()
                .all(|e| e.status == StageStatus::Passed)
        );
        assert_eq!(executor.calls(), stages(&["implement", "test", "ci"]));

        // Two snapshots per stage (running, then closed) plus the final done.
        let snapshots = sink.snapshots();
        assert_eq!(snapshots.len(), 7);
        assert_eq!(snapshots[0].stage_history[0].status, StageStatus::Running);
        assert!(snapshots.last().unwrap().is_done());
    }

    #[tokio::test]
    async fn review_rejection_rewinds_to_implement() {
        let executor = Arc::new(ReviewRejectingExecutor::new(2));
        let sink = Arc::new(MemorySink::default());
        let (_tx, rx) = mpsc::channel(8);
        let pipeline = Pipeline::new(
            "unit_1",
            PipelineConfig::new("tmpl_1", stages(&["plan", "implement", "review", "test", "ci"])),
        )
        .unwrap();

        let report = pipeline.run(executor.clone(), sink, rx).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Done);
        let reviews = report.state.attempts_of("review");
        assert_eq!(reviews.len(), 3);
        assert_eq!(reviews[0].status, StageStatus::Failed);
        assert_eq!(reviews[1].status, StageStatus::Failed);
        assert_eq!(reviews[2].status, StageStatus::Passed);
        assert_eq!(report.state.attempts_of("implement").len(), 3);
        assert_eq!(
            executor.calls.lock().clone(),
            stages(&[
                "plan", "implement", "review", "implement", "review", "implement", "review",
                "test", "ci"
            ])
        );
    }

    #[tokio::test]
    async fn review_budget_exhaustion_parks_then_skip_advances() {
        let executor = Arc::new(ReviewRejectingExecutor::new(10));
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(8);
        let mut config =
            PipelineConfig::new("tmpl_1", stages(&["implement", "review", "test"]));
        config.max_review_retries = 1;
        let pipeline = Pipeline::new("unit_1", config).unwrap();

        let handle = tokio::spawn(pipeline.run(executor.clone(), sink, rx));
        // First rejection rewinds; the second exhausts the budget and parks.
        // Skip signals are ignored while stages execute, so keep nudging.
        let report = loop {
            if handle.is_finished() {
                break handle.await.unwrap().unwrap();
            }
            let _ = tx.send(PipelineSignal::SkipStage).await;
            tokio::task::yield_now().await;
        };

        assert_eq!(report.outcome, PipelineOutcome::Done);
        let reviews = report.state.attempts_of("review");
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].status, StageStatus::Failed);
        assert_eq!(reviews[1].status, StageStatus::Skipped);
        assert_eq!(report.state.attempts_of("implement").len(), 2);
    }

    #[tokio::test]
    async fn failed_stage_retries_on_signal() {
        let executor = Arc::new(ScriptedExecutor::with_results(vec![
            StageResult::failed("agent_1", "sess_1", "flaky"),
        ]));
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(8);
        let pipeline = Pipeline::new(
            "unit_1",
            PipelineConfig::new("tmpl_1", stages(&["test"])),
        )
        .unwrap();

        let handle = tokio::spawn(pipeline.run(executor.clone(), sink, rx));
        let report = loop {
            if handle.is_finished() {
                break handle.await.unwrap().unwrap();
            }
            let _ = tx.send(PipelineSignal::Retry).await;
            tokio::task::yield_now().await;
        };

        assert_eq!(report.outcome, PipelineOutcome::Done);
        let attempts = report.state.attempts_of("test");
        assert_eq!(attempts[0].status, StageStatus::Failed);
        assert_eq!(attempts[0].feedback.as_deref(), Some("flaky"));
        assert_eq!(attempts.last().unwrap().status, StageStatus::Passed);
        assert_eq!(attempts.last().unwrap().retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_stage_times_out_and_parks() {
        let executor = Arc::new(HangingExecutor);
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(8);
        let mut config = PipelineConfig::new("tmpl_1", stages(&["implement"]));
        config.stage_timeout_ms = 1_000;
        let pipeline = Pipeline::new("unit_1", config).unwrap();

        let handle = tokio::spawn(pipeline.run(executor, sink, rx));
        // The paused clock advances past the 1s budget while the stage
        // execution stays pending, so the machine parks in the failed state.
        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.send(PipelineSignal::Abort).await.unwrap();
        let report = handle.await.unwrap().unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Aborted);
        let entry = &report.state.stage_history[0];
        assert_eq!(entry.status, StageStatus::Failed);
        assert_eq!(entry.feedback.as_deref(), Some(TIMEOUT_FEEDBACK));
        assert!(entry.completed_at.is_some());
    }

    #[tokio::test]
    async fn abort_during_execution_stops_the_pipeline() {
        let executor = Arc::new(HangingExecutor);
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(8);
        let pipeline = Pipeline::new(
            "unit_1",
            PipelineConfig::new("tmpl_1", stages(&["implement", "test"])),
        )
        .unwrap();

        let handle = tokio::spawn(pipeline.run(executor, sink.clone(), rx));
        tx.send(PipelineSignal::Abort).await.unwrap();
        let report = handle.await.unwrap().unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Aborted);
        assert_eq!(report.state.stage_history.len(), 1);
        let entry = &report.state.stage_history[0];
        assert_eq!(entry.status, StageStatus::Failed);
        assert_eq!(entry.feedback.as_deref(), Some(ABORT_FEEDBACK));
        assert!(sink.snapshots().last().unwrap().stage_history[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn resume_drops_running_entries_and_replays_remaining_stages() {
        let mut persisted = PipelineState::new("tmpl_1", "test");
        let mut implement = StageHistoryEntry::running("implement", 0);
        implement.complete(StageStatus::Passed, None);
        persisted.stage_history.push(implement);
        persisted
            .stage_history
            .push(StageHistoryEntry::running("test", 0));

        let config = PipelineConfig::new("tmpl_1", stages(&["implement", "test", "ci"]));
        let pipeline = Pipeline::resume("unit_1", persisted, config).unwrap();
        assert!(
            pipeline
                .state()
                .stage_history
                .iter()
                .all(|e| e.status != StageStatus::Running)
        );

        let executor = Arc::new(ScriptedExecutor::passing());
        let sink = Arc::new(MemorySink::default());
        let (_tx, rx) = mpsc::channel(8);
        let report = pipeline.run(executor.clone(), sink, rx).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Done);
        // Completed stages are not re-executed.
        assert_eq!(executor.calls(), stages(&["test", "ci"]));
        // New entries merged onto the surviving persisted ones.
        assert_eq!(report.state.stage_history[0].stage, "implement");
        assert_eq!(report.state.attempts_of("test").len(), 1);
    }

    #[tokio::test]
    async fn resume_of_done_pipeline_executes_nothing() {
        let mut persisted = PipelineState::new("tmpl_1", "implement");
        persisted.current_stage = DONE_STAGE.to_string();
        let config = PipelineConfig::new("tmpl_1", stages(&["implement"]));
        let pipeline = Pipeline::resume("unit_1", persisted, config).unwrap();

        let executor = Arc::new(ScriptedExecutor::passing());
        let sink = Arc::new(MemorySink::default());
        let (_tx, rx) = mpsc::channel(8);
        let report = pipeline.run(executor.clone(), sink, rx).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Done);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn resume_with_unknown_stage_is_rejected() {
        let persisted = PipelineState::new("tmpl_1", "deploy");
        let config = PipelineConfig::new("tmpl_1", stages(&["implement", "test"]));
        let err = Pipeline::resume("unit_1", persisted, config).unwrap_err();
        assert_matches!(err, PipelineError::UnknownStage(s) if s == "deploy");
    }

    #[test]
    fn empty_stage_list_is_rejected() {
        let err = Pipeline::new("unit_1", PipelineConfig::new("tmpl_1", vec![])).unwrap_err();
        assert_eq!(err, PipelineError::EmptyStages);
    }
}
