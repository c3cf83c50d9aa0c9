//! Tool Dispatch Module
//!
//! Routes each turn of a step to the registered tools and hosts the
//! built-in tools:
//! - Code edits: fenced Write/Append/Replace/Insert/FindReplace commands
//! - Read file: line ranges captured as file snippets

use std::sync::Arc;

use stepwise_tools::ToolRegistry;

pub mod dispatch;
pub mod impls;

pub use dispatch::ToolDispatcher;
pub use impls::{AutoApprove, CodeEditTool, EditReviewer, ReadFileTool, ReviewDecision};

/// Registry holding the built-in tools, code edits first.
pub fn builtin_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Arc::new(CodeEditTool::new()))
        .with_tool(Arc::new(ReadFileTool::new()))
}
