//! Parses accumulated model output into a thought segment, structured tool
//! calls, and a completion check.
//!
//! Tool calls are fenced blocks the system prompt teaches the model:
//!
//! ````text
//! ```tool
//! {"name": "write_file", "arguments": {"path": "a.txt", "content": "x"}}
//! ```
//! ````
//!
//! Completion markers are fixed sentinel tokens matched case-insensitively
//! anywhere in the response.

use proto::ToolCall;
use serde::Deserialize;
use tracing::warn;

/// Sentinel tokens signalling the model has finished the task.
pub const COMPLETION_MARKERS: &[&str] = &["task_complete", "all_done"];

const TOOL_FENCE_OPEN: &str = "```tool";
const FENCE_CLOSE: &str = "```";

#[derive(Debug, Deserialize)]
struct RawToolCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// One model response split into its parts.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    /// Explanation text with valid tool-call blocks removed.
    pub thought: String,
    /// Structured tool calls in emitted order, each with a fresh call id.
    pub tool_calls: Vec<ToolCall>,
    /// Whether a completion marker was present.
    pub completed: bool,
}

/// Splits a full model response into thought, tool calls, and completion.
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut thought = String::new();
    let mut tool_calls = Vec::new();

    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        if line.trim() != TOOL_FENCE_OPEN {
            thought.push_str(line);
            thought.push('\n');
            continue;
        }

        let mut block = String::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if inner.trim() == FENCE_CLOSE {
                closed = true;
                break;
            }
            block.push_str(inner);
            block.push('\n');
        }

        if !closed {
            // Unterminated fence: treat as prose, the model was cut off.
            thought.push_str(TOOL_FENCE_OPEN);
            thought.push('\n');
            thought.push_str(&block);
            continue;
        }

        match serde_json::from_str::<RawToolCall>(&block) {
            Ok(raw) => {
                let arguments = if raw.arguments.is_null() {
                    serde_json::Value::Object(Default::default())
                } else {
                    raw.arguments
                };
                tool_calls.push(ToolCall::new(raw.name, arguments));
            }
            Err(e) => {
                warn!("Ignoring malformed tool block: {e}");
                thought.push_str(&block);
            }
        }
    }

    let lowered = text.to_lowercase();
    let completed = COMPLETION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker));

    ParsedResponse {
        thought: thought.trim().to_string(),
        tool_calls,
        completed,
    }
}
