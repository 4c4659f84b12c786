use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category a tool belongs to. Every tool has exactly one.
///
/// Danger classification is a fixed predicate over the category: anything
/// that mutates files, spawns processes, or reaches the network is
/// dangerous and subject to edit-mode gating; read categories never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Reads file or directory contents inside the workspace.
    FileRead,
    /// Creates or mutates files inside the workspace.
    FileWrite,
    /// Spawns a subprocess (shell commands).
    Exec,
    /// Performs outbound network requests.
    Network,
}

impl ToolCategory {
    /// Returns `true` when tools in this category mutate external state.
    pub fn is_dangerous(self) -> bool {
        matches!(
            self,
            ToolCategory::FileWrite | ToolCategory::Exec | ToolCategory::Network
        )
    }

    /// Returns `true` for the write group, whose session-wide approval
    /// also upgrades the edit mode from ask to allow.
    pub fn is_write(self) -> bool {
        matches!(self, ToolCategory::FileWrite)
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::FileRead => write!(f, "file_read"),
            ToolCategory::FileWrite => write!(f, "file_write"),
            ToolCategory::Exec => write!(f, "exec"),
            ToolCategory::Network => write!(f, "network"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call identifier.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments for the invocation.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Creates a tool call with a fresh random id.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// Tool schema advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description for tool selection.
    pub description: String,
    /// JSON schema for accepted arguments.
    pub parameters: serde_json::Value,
    /// Category used for danger classification and approval grouping.
    pub category: ToolCategory,
}

impl ToolDefinition {
    /// Creates a tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        category: ToolCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            category,
        }
    }
}

/// Uniform result envelope for one tool call.
///
/// Everything the loop records about a call ends up here, including policy
/// blocks and user rejections, so the model's next turn sees exactly what
/// happened in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool-call identifier this result answers.
    pub call_id: String,
    /// Name of the tool that was (or was not) executed.
    pub tool_name: String,
    /// Output payload, or an explanation when the call did not execute.
    pub output: String,
    /// Whether this result represents a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful result.
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Creates a failed result.
    pub fn error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output: error.into(),
            is_error: true,
        }
    }

    /// Result for a call blocked by plan mode. The operation was not
    /// performed; the model should describe the change as a plan instead.
    pub fn blocked(call: &ToolCall) -> Self {
        Self::error(
            &call.id,
            &call.name,
            format!(
                "Not executed: '{}' is blocked in plan mode. Describe the intended \
                 change as a plan instead of performing it.",
                call.name
            ),
        )
    }

    /// Result for a call the user rejected. This is a user decision, not an
    /// execution failure.
    pub fn rejected(call: &ToolCall) -> Self {
        Self::error(
            &call.id,
            &call.name,
            format!("Not executed: the user rejected the '{}' call.", call.name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn danger_predicate_is_fixed_per_category() {
        assert!(!ToolCategory::FileRead.is_dangerous());
        assert!(ToolCategory::FileWrite.is_dangerous());
        assert!(ToolCategory::Exec.is_dangerous());
        assert!(ToolCategory::Network.is_dangerous());
    }

    #[test]
    fn only_file_write_is_the_write_group() {
        assert!(ToolCategory::FileWrite.is_write());
        assert!(!ToolCategory::Exec.is_write());
        assert!(!ToolCategory::Network.is_write());
        assert!(!ToolCategory::FileRead.is_write());
    }

    #[test]
    fn tool_call_new_assigns_unique_ids() {
        let a = ToolCall::new("write_file", serde_json::json!({}));
        let b = ToolCall::new("write_file", serde_json::json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn blocked_result_explains_plan_mode() {
        let call = ToolCall::new("patch_file", serde_json::json!({"path":"a.rs"}));
        let result = ToolResult::blocked(&call);
        assert!(result.is_error);
        assert_eq!(result.call_id, call.id);
        assert!(result.output.contains("plan mode"));
        assert!(result.output.contains("plan"));
    }

    #[test]
    fn rejected_result_names_the_tool() {
        let call = ToolCall::new("bash_exec", serde_json::json!({"command":"rm -rf /"}));
        let result = ToolResult::rejected(&call);
        assert!(result.is_error);
        assert!(result.output.contains("rejected"));
        assert!(result.output.contains("bash_exec"));
    }
}
