//! Domain message model.
//!
//! [`ThreadMessage`] is the persisted/rendered form of a run's output,
//! assembled from streamed [`crate::ContentBlock`]s: one agent message per
//! contiguous stretch of non-tool blocks, one tool call entry per tool
//! block, a run-end marker when the run finishes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A text or thinking fragment inside an agent message or tool call entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Visible text.
    Text {
        /// The text.
        text: String,
    },
    /// Extended thinking.
    Thinking {
        /// The thinking text.
        thinking: String,
    },
}

/// Lifecycle of a tool call entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Opened by a `tool_use` block, no result yet.
    Pending,
    /// Closed by a successful `tool_result`.
    Completed,
    /// Closed by an errored `tool_result`.
    Error,
    /// Forced closed because the run ended while the call was pending.
    Interrupted,
}

/// One message in a thread's conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ThreadMessage {
    /// Agent output: a contiguous stretch of text/thinking blocks.
    Agent {
        /// Ordered parts.
        parts: Vec<MessagePart>,
    },
    /// A tool invocation and (eventually) its result.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Tool call id.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input arguments.
        input: Value,
        /// Current status.
        status: ToolCallStatus,
        /// Result content once closed.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Nested sub-agent parts keyed to this call.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        parts: Vec<MessagePart>,
    },
    /// Terminal marker appended when a run completes, aborts, or errors.
    #[serde(rename_all = "camelCase")]
    RunEnd {
        /// The run that ended.
        run_id: String,
    },
    /// A run-level error reported by the gateway.
    Error {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl ThreadMessage {
    /// Whether this message is a run-end marker.
    pub fn is_run_end(&self) -> bool {
        matches!(self, Self::RunEnd { .. })
    }
}

/// Token usage reported with a run's final event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_message_wire_shape() {
        let msg = ThreadMessage::Agent {
            parts: vec![MessagePart::Text {
                text: "done".into(),
            }],
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["kind"], "agent");
        assert_eq!(wire["parts"][0]["type"], "text");
    }

    #[test]
    fn tool_call_omits_empty_result_and_parts() {
        let msg = ThreadMessage::ToolCall {
            id: "tu_1".into(),
            name: "bash".into(),
            input: json!({"command": "ls"}),
            status: ToolCallStatus::Pending,
            result: None,
            parts: vec![],
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["status"], "pending");
        assert!(wire.get("result").is_none());
        assert!(wire.get("parts").is_none());
    }

    #[test]
    fn run_end_round_trip() {
        let msg = ThreadMessage::RunEnd {
            run_id: "run_7".into(),
        };
        let wire = serde_json::to_string(&msg).unwrap();
        let parsed: ThreadMessage = serde_json::from_str(&wire).unwrap();
        assert!(parsed.is_run_end());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn token_usage_camel_case() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 3,
        };
        let wire = serde_json::to_value(usage).unwrap();
        assert_eq!(wire["inputTokens"], 10);
        assert_eq!(wire["outputTokens"], 3);
    }
}
