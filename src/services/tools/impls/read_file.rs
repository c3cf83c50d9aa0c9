//! Read File Tool
//!
//! Captures a line range of a workspace file as a `FileSnippet` and renders
//! it for the model.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::{FileSnippet, FunctionCall, FunctionSchema, ParameterSchema};
use stepwise_tools::{Tool, ToolResult};

use crate::utils::paths::{relative_display, resolve_in_workspace};

pub const READ_FILE_FUNCTION: &str = "read_file";

/// Lines returned when the model does not ask for a count
pub const DEFAULT_LINE_COUNT: usize = 400;

/// Read file tool, reads a bounded line range of one file.
pub struct ReadFileTool;

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }

    /// Read the requested range. Errors are returned as model-facing text.
    pub async fn read(&self, args: &Value, ctx: &ToolContext) -> Result<FileSnippet, String> {
        let path_str = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing required parameter: path".to_string())?;
        let start_line = optional_count(args, "start_line")?.unwrap_or(0);
        let line_count = optional_count(args, "line_count")?.unwrap_or(DEFAULT_LINE_COUNT);

        let root = ctx.require_working_directory().map_err(|e| e.to_string())?;
        let path = resolve_in_workspace(path_str, root).map_err(|e| e.to_string())?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", path_str, e))?;

        let relative = relative_display(&path, root);
        Ok(FileSnippet::capture(
            path,
            relative,
            &content,
            start_line,
            line_count,
        ))
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

fn optional_count(args: &Value, key: &str) -> Result<Option<usize>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| format!("Parameter {} must be a non-negative integer", key)),
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn functions(&self) -> Vec<FunctionSchema> {
        let mut properties = HashMap::new();
        properties.insert(
            "path".to_string(),
            ParameterSchema::string(Some("Path of the file, relative to the workspace")),
        );
        properties.insert(
            "start_line".to_string(),
            ParameterSchema::integer(Some("First line to read (zero-indexed, default 0)")),
        );
        properties.insert(
            "line_count".to_string(),
            ParameterSchema::integer(Some("Number of lines to read (default 400)")),
        );
        vec![FunctionSchema {
            name: READ_FILE_FUNCTION.to_string(),
            description: "Read a range of lines from a file in the workspace. Line numbers are zero-indexed and match the ones used by edit commands.".to_string(),
            parameters: ParameterSchema::object(
                Some("Read file parameters"),
                properties,
                vec!["path".to_string()],
            ),
        }]
    }

    async fn handle_call(&self, call: &FunctionCall, ctx: &ToolContext) -> Option<ToolResult> {
        if call.name != READ_FILE_FUNCTION {
            return None;
        }
        let args = match call.parsed_arguments() {
            Ok(args) => args,
            Err(e) => return Some(ToolResult::err(format!("Invalid arguments: {}", e))),
        };

        Some(match self.read(&args, ctx).await {
            Ok(snippet) => {
                tracing::debug!(
                    path = %snippet.relative_path,
                    lines = snippet.line_count,
                    "[ReadFile] captured snippet"
                );
                let log = format!(
                    "Read {} line(s) of {}",
                    snippet.line_count, snippet.relative_path
                );
                ToolResult::ok(snippet.render()).with_log(log)
            }
            Err(e) => ToolResult::err(e),
        })
    }
}
