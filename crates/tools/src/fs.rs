//! Workspace file tools: read, list, write, patch.
//!
//! Every path argument is resolved against the workspace root and must stay
//! inside it; `..` components are rejected before any filesystem access.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use proto::{ToolCategory, ToolError};
use serde::Deserialize;
use tracing::debug;

use crate::{ExecutionContext, Tool};

const MAX_READ_CHARS: usize = 50_000;

/// Resolves a tool-supplied relative path inside the workspace root.
fn resolve_path(root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return Err(ToolError::InvalidArgs(format!(
            "path must be workspace-relative: {raw}"
        )));
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(ToolError::InvalidArgs(format!(
                    "path escapes the workspace: {raw}"
                )));
            }
        }
    }
    Ok(root.join(candidate))
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

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

/// Tool that reads a file from the workspace.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the workspace and return its contents. \
         Output is limited to 50,000 characters."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path"
                }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileRead
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let args: PathArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        let path = resolve_path(&ctx.workspace_root, &args.path)?;
        debug!("Reading file: {}", path.display());
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(truncate_str(&content, MAX_READ_CHARS))
    }
}

/// Tool that lists a workspace directory.
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories are suffixed with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative directory path ('.' for the root)"
                }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileRead
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let args: PathArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        let path = resolve_path(&ctx.workspace_root, &args.path)?;
        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

/// Tool that creates or overwrites a workspace file.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a workspace file with the given content. \
         Parent directories are created as needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileWrite
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let args: WriteArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        let path = resolve_path(&ctx.workspace_root, &args.path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Writing {} bytes to {}", args.content.len(), path.display());
        tokio::fs::write(&path, &args.content).await?;
        Ok(format!("Wrote {} bytes to {}", args.content.len(), args.path))
    }
}

#[derive(Debug, Deserialize)]
struct PatchArgs {
    path: String,
    find: String,
    replace: String,
}

/// Tool that applies an exact find/replace patch to a workspace file.
pub struct PatchFileTool;

#[async_trait]
impl Tool for PatchFileTool {
    fn name(&self) -> &str {
        "patch_file"
    }

    fn description(&self) -> &str {
        "Replace one exact occurrence of 'find' with 'replace' in a workspace \
         file. Fails when the text is missing or matches more than once."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path"
                },
                "find": {
                    "type": "string",
                    "description": "Exact text to replace, must occur exactly once"
                },
                "replace": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "find", "replace"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileWrite
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let args: PatchArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        if args.find.is_empty() {
            return Err(ToolError::InvalidArgs("'find' must not be empty".into()));
        }
        let path = resolve_path(&ctx.workspace_root, &args.path)?;
        let content = tokio::fs::read_to_string(&path).await?;

        let matches = content.matches(&args.find).count();
        if matches == 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "'find' text not present in {}",
                args.path
            )));
        }
        if matches > 1 {
            return Err(ToolError::ExecutionFailed(format!(
                "'find' text occurs {matches} times in {}; it must be unique",
                args.path
            )));
        }

        let patched = content.replacen(&args.find, &args.replace, 1);
        tokio::fs::write(&path, patched).await?;
        Ok(format!("Patched {}", args.path))
    }
}
