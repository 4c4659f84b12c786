//! Shell command tool.

use async_trait::async_trait;
use proto::{ToolCategory, ToolError};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{ExecutionContext, Tool};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;
const MAX_OUTPUT_CHARS: usize = 10_000;

#[derive(Debug, Deserialize)]
struct BashArgs {
    command: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Tool that executes bash commands in the workspace root.
pub struct BashTool {
    default_timeout: Duration,
}

impl BashTool {
    /// Creates a bash tool with the default timeout.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Creates a bash tool with a custom default timeout in seconds.
    pub fn with_timeout(secs: u64) -> Self {
        Self {
            default_timeout: Duration::from_secs(secs),
        }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash_exec"
    }

    fn description(&self) -> &str {
        "Execute a bash command in the workspace root and return stdout, stderr, \
         and exit code. Output is limited to 10,000 characters. Timeout is \
         30 seconds by default."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 30, max: 300)"
                }
            },
            "required": ["command"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Exec
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let bash_args: BashArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))?;

        let timeout_duration = bash_args
            .timeout_secs
            .map(|s| Duration::from_secs(s.min(MAX_TIMEOUT_SECS)))
            .unwrap_or(self.default_timeout);

        debug!("Executing bash command: {}", bash_args.command);

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&bash_args.command);
        cmd.current_dir(&ctx.workspace_root);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let output = match timeout(timeout_duration, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Bash command timed out after {}s: {}",
                    timeout_duration.as_secs(),
                    bash_args.command
                );
                return Err(ToolError::Timeout(timeout_duration.as_secs()));
            }
        };

        let stdout = truncate_str(
            &String::from_utf8_lossy(&output.stdout),
            MAX_OUTPUT_CHARS / 2,
        );
        let stderr = truncate_str(
            &String::from_utf8_lossy(&output.stderr),
            MAX_OUTPUT_CHARS / 2,
        );
        let exit_code = output.status.code().unwrap_or(-1);

        // Non-zero exit is not an error per se — let the LLM decide.
        Ok(format_output(&stdout, &stderr, exit_code))
    }
}

/// Truncates UTF-8 text to `max_chars` code points and appends a suffix when truncated.
fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}\n[... output truncated at {max_chars} chars]")
    }
}

/// Formats command stdout/stderr and exit code into a single text payload.
fn format_output(stdout: &str, stderr: &str, exit_code: i32) -> String {
    let mut out = String::new();

    if !stdout.is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout);
        if !stdout.ends_with('\n') {
            out.push('\n');
        }
    }

    if !stderr.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("stderr:\n");
        out.push_str(stderr);
        if !stderr.ends_with('\n') {
            out.push('\n');
        }
    }

    out.push_str(&format!("\nexit_code: {exit_code}"));
    out
}
