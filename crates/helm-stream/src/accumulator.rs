//! Incremental accumulation of streamed run content.
//!
//! One [`RunAccumulator`] serves exactly one run at a time. Deltas merge
//! into the block sequence and return nothing (the interim view is read
//! through [`RunAccumulator::blocks`], keeping incremental rendering
//! decoupled from persisted-message emission); terminal events flush
//! through [`crate::assemble`] and reset, so a duplicate terminal event is
//! idempotent. Callers juggling concurrent runs use a [`RunDirectory`],
//! which keys an accumulator per run id.

use std::collections::HashMap;

use tracing::{debug, warn};

use helm_core::{ContentBlock, ThreadMessage, TokenUsage};

use crate::assemble;
use crate::event::{RunEvent, RunEventState};

/// Accumulates streamed content blocks for a single run.
#[derive(Debug, Default)]
pub struct RunAccumulator {
    run_id: Option<String>,
    blocks: Vec<ContentBlock>,
    usage: Option<TokenUsage>,
}

impl RunAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The run currently being accumulated, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Interim view of the accumulated blocks, for rendering mid-run.
    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// Latest token usage reported for the current run.
    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// Whether the accumulator holds no run state.
    pub fn is_idle(&self) -> bool {
        self.run_id.is_none() && self.blocks.is_empty()
    }

    /// Consume one run event.
    ///
    /// Deltas return an empty list; terminal events return the complete
    /// message list for the run and reset the accumulator. A delta for a
    /// different run id than the one mid-accumulation abandons the prior
    /// run's state — one accumulator handles one run at a time.
    pub fn process_event(&mut self, event: RunEvent) -> Vec<ThreadMessage> {
        if let Some(current) = &self.run_id
            && *current != event.run_id
        {
            warn!(
                previous_run = %current,
                run = %event.run_id,
                "run id changed mid-accumulation; abandoning previous run"
            );
            self.reset();
        }

        match event.state {
            RunEventState::Delta => {
                self.run_id = Some(event.run_id);
                if let Some(usage) = event.usage {
                    self.usage = Some(usage);
                }
                for block in event.message {
                    self.push_block(block);
                }
                Vec::new()
            }
            RunEventState::Final => {
                for block in event.message {
                    self.push_block(block);
                }
                if let Some(usage) = event.usage {
                    self.usage = Some(usage);
                }
                debug!(run = %event.run_id, blocks = self.blocks.len(), "run complete");
                self.flush(event.run_id)
            }
            RunEventState::Aborted => {
                // Best-effort: whatever arrived before the stop is kept.
                debug!(run = %event.run_id, blocks = self.blocks.len(), "run aborted");
                self.flush(event.run_id)
            }
            RunEventState::Error => {
                let (code, message) = event
                    .error
                    .map(|e| (e.code, e.message))
                    .unwrap_or_else(|| ("UNKNOWN".to_string(), "run failed".to_string()));
                warn!(run = %event.run_id, code, "run errored; discarding accumulated content");
                self.reset();
                vec![ThreadMessage::Error { code, message }]
            }
        }
    }

    fn flush(&mut self, run_id: String) -> Vec<ThreadMessage> {
        let mut messages = assemble::thread_messages_from_blocks(&self.blocks);
        messages.push(ThreadMessage::RunEnd { run_id });
        self.reset();
        messages
    }

    fn push_block(&mut self, block: ContentBlock) {
        if self.try_merge(&block) {
            return;
        }
        self.blocks.push(block);
    }

    /// Merge rule: a text (or thinking) delta concatenates into the last
    /// block when that block has the same type and parent.
    fn try_merge(&mut self, block: &ContentBlock) -> bool {
        let Some(last) = self.blocks.last_mut() else {
            return false;
        };
        match (last, block) {
            (
                ContentBlock::Text {
                    text: tail,
                    parent_tool_use_id: tail_parent,
                },
                ContentBlock::Text {
                    text,
                    parent_tool_use_id: parent,
                },
            ) if tail_parent == parent => {
                tail.push_str(text);
                true
            }
            (
                ContentBlock::Thinking {
                    thinking: tail,
                    parent_tool_use_id: tail_parent,
                },
                ContentBlock::Thinking {
                    thinking,
                    parent_tool_use_id: parent,
                },
            ) if tail_parent == parent => {
                tail.push_str(thinking);
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.run_id = None;
        self.blocks.clear();
        self.usage = None;
    }
}

/// Accumulators keyed by run id, for callers with concurrent runs.
///
/// Entries are created on first event for a run and dropped once the run
/// reaches a terminal event.
#[derive(Debug, Default)]
pub struct RunDirectory {
    runs: HashMap<String, RunAccumulator>,
}

impl RunDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one event to its run's accumulator.
    pub fn process_event(&mut self, event: RunEvent) -> Vec<ThreadMessage> {
        let run_id = event.run_id.clone();
        let accumulator = self.runs.entry(run_id.clone()).or_default();
        let messages = accumulator.process_event(event);
        if accumulator.is_idle() {
            let _ = self.runs.remove(&run_id);
        }
        messages
    }

    /// Interim view of one run's accumulator.
    pub fn get(&self, run_id: &str) -> Option<&RunAccumulator> {
        self.runs.get(run_id)
    }

    /// Number of runs currently mid-accumulation.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no runs are mid-accumulation.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
