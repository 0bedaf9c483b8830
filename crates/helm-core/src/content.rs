//! Content block types.
//!
//! The primitive building blocks streamed by the gateway during a run.
//! A run's output is an ordered sequence of these, built incrementally:
//! consecutive text (or thinking) deltas concatenate, tool blocks append.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One content block inside a run's streamed output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content.
    Text {
        /// The text.
        text: String,
        /// Parent tool call id when this block belongs to a sub-agent.
        #[serde(rename = "parentToolUseId", skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// Extended thinking content.
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Parent tool call id when this block belongs to a sub-agent.
        #[serde(rename = "parentToolUseId", skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// Tool invocation.
    ToolUse {
        /// Tool call id.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input arguments.
        input: Value,
        /// Parent tool call id when this call comes from a sub-agent.
        #[serde(rename = "parentToolUseId", skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// Result of an earlier tool invocation.
    ToolResult {
        /// Id of the `tool_use` block this result closes.
        #[serde(rename = "toolUseId")]
        tool_use_id: String,
        /// Result content.
        content: Value,
        /// Whether the tool errored.
        #[serde(rename = "isError", default)]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Build a top-level text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            parent_tool_use_id: None,
        }
    }

    /// Build a top-level thinking block.
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            parent_tool_use_id: None,
        }
    }

    /// Build a top-level tool use block.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            parent_tool_use_id: None,
        }
    }

    /// Build a tool result block.
    pub fn tool_result(tool_use_id: impl Into<String>, content: Value, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
        }
    }

    /// Parent tool call id, if this block belongs to a sub-agent context.
    pub fn parent_tool_use_id(&self) -> Option<&str> {
        match self {
            Self::Text {
                parent_tool_use_id, ..
            }
            | Self::Thinking {
                parent_tool_use_id, ..
            }
            | Self::ToolUse {
                parent_tool_use_id, ..
            } => parent_tool_use_id.as_deref(),
            Self::ToolResult { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_block_wire_shape() {
        let block = ContentBlock::text("hello");
        let wire = serde_json::to_value(&block).unwrap();
        assert_eq!(wire["type"], "text");
        assert_eq!(wire["text"], "hello");
        assert!(wire.get("parentToolUseId").is_none());
    }

    #[test]
    fn tool_use_round_trip() {
        let block = ContentBlock::tool_use("tu_1", "bash", json!({"command": "ls"}));
        let wire = serde_json::to_string(&block).unwrap();
        let parsed: ContentBlock = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn tool_result_is_error_defaults_false() {
        let raw = r#"{"type":"tool_result","toolUseId":"tu_1","content":"done"}"#;
        let block: ContentBlock = serde_json::from_str(raw).unwrap();
        let ContentBlock::ToolResult { is_error, .. } = block else {
            panic!("expected tool_result");
        };
        assert!(!is_error);
    }

    #[test]
    fn nested_block_carries_parent_id() {
        let raw = r#"{"type":"text","text":"from subagent","parentToolUseId":"tu_9"}"#;
        let block: ContentBlock = serde_json::from_str(raw).unwrap();
        assert_eq!(block.parent_tool_use_id(), Some("tu_9"));
    }
}
