//! Shared protocol types for the gateway, agent runtime, and tools.
//!
//! This crate defines serializable message/event/tool structures and
//! strongly-typed error enums shared across the workspace.

pub mod approval;
pub mod error;
pub mod event;
pub mod message;
pub mod mode;
pub mod tool;

/// Re-export of approval request/decision types.
pub use approval::{ApprovalDecision, ApprovalRequest};
/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of run event and result types.
pub use event::{AgentEvent, AgentRunResult, AgentStep, CompletionReason};
/// Re-export of conversation/message identity types.
pub use message::{AgentMessage, Role, SessionId};
/// Re-export of the edit-mode enum.
pub use mode::EditMode;
/// Re-export of tool call, definition, and result types.
pub use tool::{ToolCall, ToolCategory, ToolDefinition, ToolResult};
