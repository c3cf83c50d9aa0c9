//! Built-in Tool Implementations
//!
//! Each tool is a separate struct implementing the `Tool` trait:
//! - `CodeEditTool`: fenced edit commands, as prose or `apply_code_edits`
//! - `ReadFileTool`: bounded line ranges via `read_file`

pub mod code_edit;
pub mod read_file;

pub use code_edit::{AppliedEdits, AutoApprove, CodeEditTool, EditReviewer, ReviewDecision};
pub use read_file::ReadFileTool;
