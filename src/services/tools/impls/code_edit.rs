//! Code Edit Tool
//!
//! Applies fenced edit commands written by the model, either as prose the
//! tool claims as a pseudo-function or through the structured
//! `apply_code_edits` function.
//!
//! Every batch goes through the same pipeline: strict parse, path
//! resolution inside the workspace, grouping with index adjustment, preview,
//! review, staged commit. A failure before the commit aborts the batch with
//! nothing written; a failure while moving staged files into place reports
//! the files already replaced. Either way the model gets the outcome as text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::{ContentItem, FileSnippet, FunctionCall, FunctionSchema, ParameterSchema};
use stepwise_tools::{PseudoFunctionOutput, Tool, ToolResult};

use crate::services::edits::{
    commit_all, contains_edit_commands, edits_of, group_edits, parse, preview_file_edit, CodeEdit,
    EditError, EditPreview, FENCE, FIND_REPLACE_DIVIDER,
};
use crate::utils::error::{AgentError, AgentResult};
use crate::utils::paths::{relative_display, resolve_in_workspace};

pub const APPLY_CODE_EDITS_FUNCTION: &str = "apply_code_edits";

/// Unchanged lines kept around each change in diff summaries
const DIFF_CONTEXT_LINES: usize = 3;

/// Outcome of reviewing a batch of previews
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

/// Gate between previewing a batch and writing it to disk.
#[async_trait]
pub trait EditReviewer: Send + Sync {
    async fn review(&self, previews: &[EditPreview]) -> ReviewDecision;
}

/// Reviewer that approves every batch
pub struct AutoApprove;

#[async_trait]
impl EditReviewer for AutoApprove {
    async fn review(&self, _previews: &[EditPreview]) -> ReviewDecision {
        ReviewDecision::Approve
    }
}

/// A committed batch
#[derive(Debug, Clone)]
pub struct AppliedEdits {
    pub root: PathBuf,
    pub previews: Vec<EditPreview>,
    pub logs: Vec<String>,
}

impl AppliedEdits {
    /// Per-file `+N -M` counts followed by the collapsed diff.
    pub fn summary(&self) -> String {
        let mut sections = Vec::with_capacity(self.previews.len());
        for preview in &self.previews {
            let relative = relative_display(&preview.path, &self.root);
            let verb = if preview.creates_file() {
                "Created"
            } else {
                "Edited"
            };
            let diff = preview.diff.to_text(DIFF_CONTEXT_LINES);
            sections.push(format!(
                "{} {} (+{} -{})\n{}",
                verb,
                relative,
                preview.diff.insertions(),
                preview.diff.deletions(),
                diff
            ));
        }
        sections.join("\n\n")
    }

    /// Snapshots of the edited files, superseding older context for the same paths.
    pub fn snippets(&self) -> Vec<FileSnippet> {
        self.previews
            .iter()
            .map(|preview| {
                FileSnippet::capture(
                    preview.path.clone(),
                    relative_display(&preview.path, &self.root),
                    &preview.new_content,
                    0,
                    usize::MAX,
                )
            })
            .collect()
    }
}

pub struct CodeEditTool {
    reviewer: Arc<dyn EditReviewer>,
}

impl CodeEditTool {
    pub fn new() -> Self {
        Self {
            reviewer: Arc::new(AutoApprove),
        }
    }

    pub fn with_reviewer(reviewer: Arc<dyn EditReviewer>) -> Self {
        Self { reviewer }
    }

    /// Parse, plan, preview, review and commit the edits in `text`.
    pub async fn apply(&self, text: &str, ctx: &ToolContext) -> AgentResult<AppliedEdits> {
        let edits = edits_of(parse(text)?);
        if edits.is_empty() {
            return Err(AgentError::validation("No edit commands found"));
        }

        let root = ctx.require_working_directory()?.to_path_buf();
        let edits = edits
            .into_iter()
            .map(|edit| resolve_edit_path(edit, &root))
            .collect::<AgentResult<Vec<_>>>()?;

        let groups = group_edits(edits)?;
        let mut previews = Vec::with_capacity(groups.len());
        let mut logs = Vec::new();
        for group in &groups {
            let relative = PathBuf::from(relative_display(&group.path, &root));
            logs.extend(
                group
                    .edits
                    .iter()
                    .map(|edit| edit.clone().with_path(relative.clone()).describe()),
            );
            previews.push(preview_file_edit(group).await?);
        }

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if let ReviewDecision::Reject { reason } = self.reviewer.review(&previews).await {
            tracing::info!(reason = %reason, "[CodeEdit] batch rejected by reviewer");
            return Err(AgentError::validation(format!("Edits rejected: {}", reason)));
        }

        if let Err(failure) = commit_all(&previews).await {
            if failure.committed.is_empty() {
                return Err(failure.error.into());
            }
            let written = failure
                .committed
                .iter()
                .map(|path| relative_display(path, &root))
                .collect();
            return Err(EditError::PartiallyCommitted {
                written,
                source: Box::new(failure.error),
            }
            .into());
        }
        tracing::info!(files = previews.len(), "[CodeEdit] batch committed");

        Ok(AppliedEdits {
            root,
            previews,
            logs,
        })
    }
}

impl Default for CodeEditTool {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_edit_path(edit: CodeEdit, root: &Path) -> AgentResult<CodeEdit> {
    let raw = edit.path().to_string_lossy().to_string();
    let resolved = resolve_in_workspace(&raw, root)?;
    Ok(edit.with_path(resolved))
}

fn failure_text(err: &AgentError) -> String {
    match err {
        AgentError::Edit(EditError::PartiallyCommitted { written, source }) => format!(
            "Failed to apply edits: {}. These files were already written: {}. \
             The other files were not changed.",
            source,
            written.join(", ")
        ),
        _ => format!("Failed to apply edits: {}. No files were changed.", err),
    }
}

fn protocol_instructions() -> String {
    format!(
        "## Editing Files\n\n\
         To change files, write edit commands in your reply. Each command is a line starting \
         with `>` followed by a block fenced with `{fence}`:\n\n\
         {fence}\n> Write path/to/file.ext\n<full file content>\n{fence}\n\n\
         {fence}\n> Append path/to/file.ext\n<lines to add at the end>\n{fence}\n\n\
         {fence}\n> Replace path/to/file.ext:10-12\n<replacement for lines 10 to 12>\n{fence}\n\n\
         {fence}\n> Insert path/to/file.ext:0\n<lines to insert before line 0>\n{fence}\n\n\
         {fence}\n> FindReplace path/to/file.ext\n<lines to find, verbatim>\n{divider}\n<replacement lines>\n{fence}\n\n\
         Line numbers are zero-indexed and refer to the file before any of your edits. \
         Ranges in one reply must not overlap. A FindReplace must match exactly once. \
         Inside a block, write a literal `{fence}` line as `\\{fence}`.",
        fence = FENCE,
        divider = FIND_REPLACE_DIVIDER,
    )
}

#[async_trait]
impl Tool for CodeEditTool {
    fn name(&self) -> &str {
        "code_edit"
    }

    fn functions(&self) -> Vec<FunctionSchema> {
        let mut properties = HashMap::new();
        properties.insert(
            "edits".to_string(),
            ParameterSchema::string(Some("One or more fenced edit commands")),
        );
        vec![FunctionSchema {
            name: APPLY_CODE_EDITS_FUNCTION.to_string(),
            description: "Apply fenced edit commands (Write, Append, Replace, Insert, FindReplace) to files in the workspace.".to_string(),
            parameters: ParameterSchema::object(
                Some("Code edit parameters"),
                properties,
                vec!["edits".to_string()],
            ),
        }]
    }

    async fn handle_call(&self, call: &FunctionCall, ctx: &ToolContext) -> Option<ToolResult> {
        if call.name != APPLY_CODE_EDITS_FUNCTION {
            return None;
        }
        let args = match call.parsed_arguments() {
            Ok(args) => args,
            Err(e) => return Some(ToolResult::err(format!("Invalid arguments: {}", e))),
        };
        let Some(text) = args.get("edits").and_then(|v| v.as_str()) else {
            return Some(ToolResult::err("Missing required parameter: edits"));
        };

        Some(match self.apply(text, ctx).await {
            Ok(applied) => {
                let mut result = ToolResult::ok(applied.summary());
                for line in applied.logs {
                    result = result.with_log(line);
                }
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "[CodeEdit] structured edit failed");
                ToolResult::err(failure_text(&e))
            }
        })
    }

    fn can_handle_pseudo_function(&self, text: &str) -> bool {
        contains_edit_commands(text)
    }

    async fn handle_pseudo_function(
        &self,
        text: &str,
        ctx: &ToolContext,
    ) -> Option<PseudoFunctionOutput> {
        if !contains_edit_commands(text) {
            return None;
        }
        let output = match self.apply(text, ctx).await {
            Ok(applied) => {
                let mut items = vec![ContentItem::text(applied.summary())];
                items.extend(applied.snippets().into_iter().map(ContentItem::FileSnippet));
                PseudoFunctionOutput {
                    items,
                    logs: applied.logs,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "[CodeEdit] edit failed");
                PseudoFunctionOutput::text(failure_text(&e)).with_log(e.to_string())
            }
        };
        Some(output)
    }

    async fn context_to_insert_at_beginning_of_thread(&self, _ctx: &ToolContext) -> Option<String> {
        Some(protocol_instructions())
    }
}
