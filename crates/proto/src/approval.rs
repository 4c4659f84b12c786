//! Tool call approval types shared across the gateway and the agent runtime.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::SessionId;
use crate::tool::ToolCategory;

/// User's decision on a tool call approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Execute this single call; persist nothing.
    AllowOnce,
    /// Execute, and approve future calls for the session. On a write-group
    /// tool this approves the whole group and upgrades the session mode
    /// from ask to allow; on exec/network tools it approves only the tool.
    AllowAll,
    /// Do not execute. Reported to the model as a rejected-tool result.
    Stop,
}

impl std::str::FromStr for ApprovalDecision {
    type Err = crate::error::ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow_once" => Ok(ApprovalDecision::AllowOnce),
            "allow_all" => Ok(ApprovalDecision::AllowAll),
            "stop" => Ok(ApprovalDecision::Stop),
            other => Err(crate::error::ProtoError::InvalidDecision(other.to_string())),
        }
    }
}

/// A pending request for user approval before a tool call executes.
///
/// Created when the edit-mode policy returns needs-approval and destroyed
/// when resolved. At most one exists per (session, tool call).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request identifier used by `respond_to_approval`.
    pub id: String,
    /// Session the suspended run belongs to.
    pub session_id: SessionId,
    /// Tool-call identifier awaiting the decision.
    pub call_id: String,
    /// Name of the tool to be executed.
    pub tool_name: String,
    /// Category of the tool, relevant for allow-all grouping.
    pub category: ToolCategory,
    /// JSON arguments for the tool call, shown to the user verbatim.
    pub arguments: serde_json::Value,
}

impl ApprovalRequest {
    /// Creates a request with a fresh random id.
    pub fn new(
        session_id: SessionId,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        category: ToolCategory,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            category,
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn decision_parses_wire_values() {
        assert_eq!(
            ApprovalDecision::from_str("allow_once").unwrap(),
            ApprovalDecision::AllowOnce
        );
        assert_eq!(
            ApprovalDecision::from_str("allow_all").unwrap(),
            ApprovalDecision::AllowAll
        );
        assert_eq!(
            ApprovalDecision::from_str("stop").unwrap(),
            ApprovalDecision::Stop
        );
        assert!(ApprovalDecision::from_str("maybe").is_err());
    }

    #[test]
    fn request_new_assigns_id_and_keeps_fields() {
        let req = ApprovalRequest::new(
            SessionId::from("s1"),
            "call-9",
            "write_file",
            ToolCategory::FileWrite,
            serde_json::json!({"path":"a.txt"}),
        );
        assert!(!req.id.is_empty());
        assert_eq!(req.call_id, "call-9");
        assert_eq!(req.tool_name, "write_file");
        assert_eq!(req.category, ToolCategory::FileWrite);
        assert_eq!(req.arguments["path"], "a.txt");
    }
}
