//! Code-Edit Protocol Engine
//!
//! Parses fenced edit commands out of assistant text, groups them into
//! per-file edit lists with adjusted coordinates, and applies them to produce
//! new file contents plus reviewable diffs.
//!
//! ```text
//! %%%
//! > Replace src/lib.rs:10-12
//! replacement lines
//! %%%
//! ```
//!
//! Pipeline: `parser::parse` -> `grouping::group_edits` -> `apply::preview_file_edit`
//! -> review -> `apply::commit_all`.

pub mod apply;
pub mod diff;
pub mod grouping;
pub mod parser;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use apply::{
    apply_edit, apply_file_edit, commit_all, preview_file_edit, CommitFailure, EditPreview,
};
pub use diff::{DiffLine, DiffOp, DiffSegment, FileDiff};
pub use grouping::{group_edits, FileEdit};
pub use parser::{contains_edit_commands, escape_block_line, parse, parse_partial};

/// Fence delimiter opening and closing every edit block
pub const FENCE: &str = "%%%";

/// Divider between the find and replace halves of a `FindReplace` block
pub const FIND_REPLACE_DIVIDER: &str = "===WITH===";

/// Errors produced while parsing, planning or applying edits
#[derive(Error, Debug)]
pub enum EditError {
    #[error("Unterminated edit block for '{command}': missing closing %%%")]
    UnterminatedBlock { command: String },

    #[error("Malformed edit command: '{line}'")]
    MalformedCommand { line: String },

    #[error("Invalid line specification '{spec}' (expected <start> or <start>-<end>)")]
    InvalidLineSpec { spec: String },

    #[error("FindReplace block for {path} has no ===WITH=== divider")]
    MissingDivider { path: String },

    #[error("FindReplace block for {path} has {count} ===WITH=== dividers; expected exactly one")]
    MultipleDividers { path: String, count: usize },

    #[error("Overlapping line edits in {path} at lines {first_start} and {second_start}")]
    OverlappingEdits {
        path: String,
        first_start: usize,
        second_start: usize,
    },

    #[error("Invalid line range in {path}: start {start}, length {len}, but the file has {line_count} lines")]
    InvalidRange {
        path: String,
        start: usize,
        len: usize,
        line_count: usize,
    },

    #[error("Text to find was not found in {path}")]
    FindNotFound { path: String },

    #[error("Text to find matches {matches} locations in {path}; include more surrounding lines so it matches exactly one")]
    AmbiguousFind { path: String, matches: usize },

    #[error("FindReplace block for {path} has nothing to find")]
    EmptyFind { path: String },

    #[error("{path} is not a regular file")]
    NotAFile { path: String },

    #[error("{source}")]
    PartiallyCommitted {
        written: Vec<String>,
        source: Box<EditError>,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl EditError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type EditResult<T> = Result<T, EditError>;

/// One patch primitive, scoped to a single file.
///
/// Line numbers are zero-indexed and refer to the file as it was before any
/// edit of the same batch was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodeEdit {
    /// Replace `line_range_len` lines starting at `line_range_start`.
    /// A length of zero inserts before `line_range_start`.
    Replace {
        path: PathBuf,
        line_range_start: usize,
        line_range_len: usize,
        new_lines: Vec<String>,
    },
    /// Create or overwrite the whole file
    Write { path: PathBuf, content: String },
    /// Add to the end of the file
    Append { path: PathBuf, content: String },
    /// Replace the single verbatim occurrence of `find_lines`
    FindReplace {
        path: PathBuf,
        find_lines: Vec<String>,
        replace_lines: Vec<String>,
    },
}

impl CodeEdit {
    pub fn path(&self) -> &Path {
        match self {
            CodeEdit::Replace { path, .. }
            | CodeEdit::Write { path, .. }
            | CodeEdit::Append { path, .. }
            | CodeEdit::FindReplace { path, .. } => path,
        }
    }

    /// The same edit aimed at another path.
    pub fn with_path(mut self, new_path: PathBuf) -> Self {
        match &mut self {
            CodeEdit::Replace { path, .. }
            | CodeEdit::Write { path, .. }
            | CodeEdit::Append { path, .. }
            | CodeEdit::FindReplace { path, .. } => *path = new_path,
        }
        self
    }

    /// Net change in line count of a `Replace`; zero for other edits.
    pub fn line_delta(&self) -> isize {
        match self {
            CodeEdit::Replace {
                line_range_len,
                new_lines,
                ..
            } => {
                let added = isize::try_from(new_lines.len()).unwrap_or(isize::MAX);
                let removed = isize::try_from(*line_range_len).unwrap_or(isize::MAX);
                added.saturating_sub(removed)
            }
            _ => 0,
        }
    }

    /// Short human description used in tool logs
    pub fn describe(&self) -> String {
        match self {
            CodeEdit::Replace {
                path,
                line_range_start,
                line_range_len: 0,
                new_lines,
            } => format!(
                "Insert {} line(s) into {} at line {}",
                new_lines.len(),
                path.display(),
                line_range_start
            ),
            CodeEdit::Replace {
                path,
                line_range_start,
                line_range_len,
                new_lines,
            } => format!(
                "Replace lines {}-{} of {} with {} line(s)",
                line_range_start,
                line_range_start + line_range_len - 1,
                path.display(),
                new_lines.len()
            ),
            CodeEdit::Write { path, .. } => format!("Write {}", path.display()),
            CodeEdit::Append { path, .. } => format!("Append to {}", path.display()),
            CodeEdit::FindReplace { path, .. } => format!("Find and replace in {}", path.display()),
        }
    }
}

/// A piece of parsed assistant text: narrative prose or one edit, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Part {
    Text(String),
    Edit(CodeEdit),
}

/// The edits of a parsed part list, in order.
pub fn edits_of(parts: Vec<Part>) -> Vec<CodeEdit> {
    parts
        .into_iter()
        .filter_map(|part| match part {
            Part::Edit(edit) => Some(edit),
            Part::Text(_) => None,
        })
        .collect()
}

/// Split file content into lines. Empty content has no lines.
pub fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    content.split('\n').map(str::to_string).collect()
}

pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}
