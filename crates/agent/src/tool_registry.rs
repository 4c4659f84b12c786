//! Tool registry: name-indexed lookup plus the execution boundary that
//! turns executor failures into error results instead of run failures.

use std::collections::HashMap;
use std::sync::Arc;

use proto::{EditMode, ToolCall, ToolCategory, ToolDefinition, ToolError, ToolResult};
use tools::{ExecutionContext, Tool};
use tracing::{debug, error};

/// Holds every tool available to the agent, keyed by unique name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
                category: tool.category(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Names of registered tools in a given category, sorted.
    pub fn list(&self, category: ToolCategory) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .values()
            .filter(|tool| tool.category() == category)
            .map(|tool| tool.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Executes one tool call under the context's edit mode.
    ///
    /// Unknown tool names are hard errors. A dangerous tool in plan mode
    /// never reaches its executor, even if a caller skipped the policy
    /// check. Executor failures become error results so the run continues
    /// and the model sees what went wrong.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let Some(tool) = self.get(&call.name) else {
            error!(tool = %call.name, "Unknown tool requested");
            return Err(ToolError::Unknown(call.name.clone()));
        };

        if ctx.mode == EditMode::Plan && tool.dangerous() {
            return Ok(ToolResult::blocked(call));
        }

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        match tool.execute(call.arguments.clone(), ctx).await {
            Ok(output) => Ok(ToolResult::success(&call.id, &call.name, output)),
            Err(e) => {
                error!(tool = %call.name, error = %e, "Tool execution failed");
                Ok(ToolResult::error(&call.id, &call.name, e.to_string()))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
