use serde::{Deserialize, Serialize};

use crate::approval::ApprovalRequest;
use crate::mode::EditMode;
use crate::tool::{ToolCall, ToolResult};

/// Why a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The model signalled completion, or issued no further tool calls.
    Done,
    /// The iteration cap was reached before the model finished.
    MaxIterations,
    /// The wall-clock cap was reached before the model finished.
    TimeLimit,
    /// The model connection failed.
    Error,
    /// The run was cancelled (chat closed or explicit stop).
    Aborted,
}

/// One iteration of the agent loop: what the model thought, what it called,
/// and what came back, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    /// Zero-based iteration number within the run.
    pub iteration: usize,
    /// Thought/explanation segment of the model response.
    pub thought: String,
    /// Tool calls parsed from the response, in emitted order.
    pub tool_calls: Vec<ToolCall>,
    /// One result per call, same order as `tool_calls`.
    pub tool_results: Vec<ToolResult>,
    /// Whether this step completed the run.
    pub done: bool,
}

/// Per-run record handed to the caller when a run terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResult {
    /// `true` only for a normal completion.
    pub success: bool,
    /// Number of iterations executed.
    pub iterations: usize,
    /// Final (possibly partial) assistant text.
    pub final_response: String,
    /// Why the run ended.
    pub reason: CompletionReason,
}

/// Events emitted by a running agent loop, delivered in emission order.
///
/// Exactly one terminal event (`Complete` or `Error`) is emitted per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Incremental model output, forwarded in generation order.
    TextChunk { text: String },
    /// One full iteration finished.
    Step(AgentStep),
    /// A tool call is suspended waiting for a user decision.
    ApprovalRequired(ApprovalRequest),
    /// The session's edit mode changed (allow-all on a write tool).
    /// Applied to session state by the loop's caller, never mutated
    /// inside tool dispatch.
    ModeChanged { mode: EditMode },
    /// Terminal event: the run finished.
    Complete(AgentRunResult),
    /// Terminal event: the run failed.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_reason_serializes_snake_case() {
        let json = serde_json::to_string(&CompletionReason::MaxIterations).unwrap();
        assert_eq!(json, "\"max_iterations\"");
        let json = serde_json::to_string(&CompletionReason::TimeLimit).unwrap();
        assert_eq!(json, "\"time_limit\"");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = AgentEvent::TextChunk {
            text: "hi".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text_chunk");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn step_round_trips_through_json() {
        let step = AgentStep {
            iteration: 2,
            thought: "writing file".to_string(),
            tool_calls: vec![ToolCall::new("write_file", serde_json::json!({}))],
            tool_results: vec![ToolResult::success("c", "write_file", "ok")],
            done: false,
        };
        let json = serde_json::to_string(&AgentEvent::Step(step)).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        match back {
            AgentEvent::Step(s) => {
                assert_eq!(s.iteration, 2);
                assert_eq!(s.tool_calls.len(), 1);
                assert_eq!(s.tool_results.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
