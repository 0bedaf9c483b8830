//! Block-sequence to message conversion.
//!
//! Shared by the live path (accumulator flush on a terminal event) and the
//! batch path (replaying persisted run history). Contiguous non-tool blocks
//! form one agent message; each `tool_use` opens an entry that a matching
//! `tool_result` later closes; text/thinking blocks whose parent id matches
//! an open entry nest inside that entry instead of the top level.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use helm_core::{ContentBlock, MessagePart, ThreadMessage, ToolCallStatus};

/// Synthetic result text for tool calls still open when their run ended.
pub const INTERRUPTED_RESULT: &str = "Tool execution was interrupted.";

/// One already-completed run as read back from persisted history.
#[derive(Clone, Debug)]
pub struct CompletedRun {
    /// The run's id.
    pub run_id: String,
    /// The run's full block sequence.
    pub blocks: Vec<ContentBlock>,
    /// Completion timestamp, when the run finished cleanly.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Convert one run's block sequence into thread messages.
///
/// Tool entries with no matching result by the end of the sequence are
/// forced to [`ToolCallStatus::Interrupted`] with a synthetic result, so a
/// finished run can never leave a call looking in-progress.
pub fn thread_messages_from_blocks(blocks: &[ContentBlock]) -> Vec<ThreadMessage> {
    let mut messages: Vec<ThreadMessage> = Vec::new();
    // tool_use id -> index of its entry in `messages`
    let mut open_tools: HashMap<&str, usize> = HashMap::new();

    for block in blocks {
        match block {
            ContentBlock::Text {
                text,
                parent_tool_use_id,
            } => push_part(
                &mut messages,
                &open_tools,
                parent_tool_use_id.as_deref(),
                MessagePart::Text { text: text.clone() },
            ),
            ContentBlock::Thinking {
                thinking,
                parent_tool_use_id,
            } => push_part(
                &mut messages,
                &open_tools,
                parent_tool_use_id.as_deref(),
                MessagePart::Thinking {
                    thinking: thinking.clone(),
                },
            ),
            ContentBlock::ToolUse {
                id, name, input, ..
            } => {
                let _ = open_tools.insert(id, messages.len());
                messages.push(ThreadMessage::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                    status: ToolCallStatus::Pending,
                    result: None,
                    parts: Vec::new(),
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let Some(idx) = open_tools.remove(tool_use_id.as_str()) else {
                    debug!(tool_use_id, "tool result without a matching tool call");
                    continue;
                };
                if let ThreadMessage::ToolCall { status, result, .. } = &mut messages[idx] {
                    *status = if *is_error {
                        ToolCallStatus::Error
                    } else {
                        ToolCallStatus::Completed
                    };
                    *result = Some(content.clone());
                }
            }
        }
    }

    for (_, idx) in open_tools {
        if let ThreadMessage::ToolCall { status, result, .. } = &mut messages[idx] {
            *status = ToolCallStatus::Interrupted;
            *result = Some(Value::String(INTERRUPTED_RESULT.to_string()));
        }
    }
    messages
}

/// Rebuild a full conversation from persisted run history.
///
/// Replays the same conversion rules per run and synthesizes a run-end
/// marker for every run with a completion timestamp.
pub fn thread_messages_from_history(runs: &[CompletedRun]) -> Vec<ThreadMessage> {
    let mut messages = Vec::new();
    for run in runs {
        messages.extend(thread_messages_from_blocks(&run.blocks));
        if run.completed_at.is_some() {
            messages.push(ThreadMessage::RunEnd {
                run_id: run.run_id.clone(),
            });
        }
    }
    messages
}

fn push_part(
    messages: &mut Vec<ThreadMessage>,
    open_tools: &HashMap<&str, usize>,
    parent: Option<&str>,
    part: MessagePart,
) {
    if let Some(parent_id) = parent
        && let Some(&idx) = open_tools.get(parent_id)
    {
        if let ThreadMessage::ToolCall { parts, .. } = &mut messages[idx] {
            parts.push(part);
        }
        return;
    }
    if let Some(ThreadMessage::Agent { parts }) = messages.last_mut() {
        parts.push(part);
    } else {
        messages.push(ThreadMessage::Agent { parts: vec![part] });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn contiguous_text_blocks_form_one_agent_message() {
        let blocks = vec![
            ContentBlock::thinking("let me check"),
            ContentBlock::text("hello"),
            ContentBlock::tool_use("tu_1", "bash", json!({"command": "ls"})),
            ContentBlock::text("and after"),
        ];
        let messages = thread_messages_from_blocks(&blocks);
        assert_eq!(messages.len(), 3);
        assert_matches!(&messages[0], ThreadMessage::Agent { parts } if parts.len() == 2);
        assert_matches!(&messages[1], ThreadMessage::ToolCall { .. });
        assert_matches!(&messages[2], ThreadMessage::Agent { parts } if parts.len() == 1);
    }

    #[test]
    fn tool_result_closes_its_entry() {
        let blocks = vec![
            ContentBlock::tool_use("tu_1", "bash", json!({"command": "ls"})),
            ContentBlock::tool_result("tu_1", json!("src\ntests"), false),
        ];
        let messages = thread_messages_from_blocks(&blocks);
        assert_matches!(
            &messages[0],
            ThreadMessage::ToolCall { status: ToolCallStatus::Completed, result: Some(r), .. }
                if r == &json!("src\ntests")
        );
    }

    #[test]
    fn errored_tool_result_marks_entry_error() {
        let blocks = vec![
            ContentBlock::tool_use("tu_1", "bash", json!({"command": "boom"})),
            ContentBlock::tool_result("tu_1", json!("exit 1"), true),
        ];
        let messages = thread_messages_from_blocks(&blocks);
        assert_matches!(
            &messages[0],
            ThreadMessage::ToolCall { status: ToolCallStatus::Error, .. }
        );
    }

    #[test]
    fn unmatched_tool_entry_is_forced_interrupted() {
        let blocks = vec![ContentBlock::tool_use("tu_1", "bash", json!({}))];
        let messages = thread_messages_from_blocks(&blocks);
        assert_matches!(
            &messages[0],
            ThreadMessage::ToolCall { status: ToolCallStatus::Interrupted, result: Some(r), .. }
                if r == &json!(INTERRUPTED_RESULT)
        );
    }

    #[test]
    fn parented_blocks_nest_inside_open_tool_entry() {
        let blocks = vec![
            ContentBlock::tool_use("tu_sub", "task", json!({"prompt": "explore"})),
            ContentBlock::Text {
                text: "sub-agent says hi".into(),
                parent_tool_use_id: Some("tu_sub".into()),
            },
            ContentBlock::tool_result("tu_sub", json!("done"), false),
        ];
        let messages = thread_messages_from_blocks(&blocks);
        assert_eq!(messages.len(), 1);
        assert_matches!(
            &messages[0],
            ThreadMessage::ToolCall { parts, status: ToolCallStatus::Completed, .. }
                if parts == &vec![MessagePart::Text { text: "sub-agent says hi".into() }]
        );
    }

    #[test]
    fn parented_block_with_closed_parent_goes_top_level() {
        let blocks = vec![
            ContentBlock::tool_use("tu_1", "task", json!({})),
            ContentBlock::tool_result("tu_1", json!("done"), false),
            ContentBlock::Text {
                text: "late".into(),
                parent_tool_use_id: Some("tu_1".into()),
            },
        ];
        let messages = thread_messages_from_blocks(&blocks);
        assert_eq!(messages.len(), 2);
        assert_matches!(&messages[1], ThreadMessage::Agent { .. });
    }

    #[test]
    fn orphan_tool_result_is_ignored() {
        let blocks = vec![
            ContentBlock::text("hi"),
            ContentBlock::tool_result("tu_missing", json!("?"), false),
        ];
        let messages = thread_messages_from_blocks(&blocks);
        assert_eq!(messages.len(), 1);
        assert_matches!(&messages[0], ThreadMessage::Agent { .. });
    }

    #[test]
    fn history_replay_synthesizes_run_end_markers() {
        let runs = vec![
            CompletedRun {
                run_id: "run_1".into(),
                blocks: vec![ContentBlock::text("first")],
                completed_at: Some(Utc::now()),
            },
            CompletedRun {
                run_id: "run_2".into(),
                blocks: vec![ContentBlock::text("second")],
                completed_at: None,
            },
        ];
        let messages = thread_messages_from_history(&runs);
        assert_eq!(messages.len(), 3);
        assert_matches!(&messages[1], ThreadMessage::RunEnd { run_id } if run_id == "run_1");
        assert_matches!(&messages[2], ThreadMessage::Agent { .. });
    }
}
