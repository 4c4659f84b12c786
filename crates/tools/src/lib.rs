//! Tool trait and built-in tool implementations.
//!
//! The agent runtime uses this crate to expose executable capabilities:
//! workspace file access, shell commands, and web fetches. Executors return
//! `Result`; the registry converts any `Err` into a failed tool result so a
//! misbehaving tool can never abort a run.

pub mod fs;
pub mod shell;
pub mod web;

pub use fs::{ListDirTool, PatchFileTool, ReadFileTool, WriteFileTool};
pub use shell::BashTool;
pub use web::WebFetchTool;

use std::path::PathBuf;

use async_trait::async_trait;
use proto::{EditMode, SessionId, ToolCategory, ToolError};

/// Context carried into every tool execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Session the calling run belongs to.
    pub session_id: SessionId,
    /// Root directory tools are confined to.
    pub workspace_root: PathBuf,
    /// Edit mode active when the call was dispatched.
    pub mode: EditMode,
}

impl ExecutionContext {
    /// Creates an execution context for a session rooted at `workspace_root`.
    pub fn new(session_id: SessionId, workspace_root: impl Into<PathBuf>, mode: EditMode) -> Self {
        Self {
            session_id,
            workspace_root: workspace_root.into(),
            mode,
        }
    }
}

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name exposed to the LLM.
    fn name(&self) -> &str;
    /// Human-readable description for tool selection.
    fn description(&self) -> &str;
    /// JSON schema for accepted tool arguments.
    fn parameters_schema(&self) -> serde_json::Value;
    /// Category used for danger classification and approval grouping.
    fn category(&self) -> ToolCategory;
    /// Whether this tool mutates external state. Fixed predicate over the
    /// category; tools do not override this.
    fn dangerous(&self) -> bool {
        self.category().is_dangerous()
    }
    /// Executes the tool. An `Err` becomes a failed tool result at the
    /// registry boundary and never propagates into the loop.
    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError>;
}
