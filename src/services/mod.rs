//! Services
//!
//! Business logic of the agent runtime: the thread store, the code-edit
//! engine, tool dispatch, and the run controller.

pub mod edits;
pub mod orchestrator;
pub mod thread_store;
pub mod tools;

pub use orchestrator::{AgentRunController, RunOptions};
pub use thread_store::{RunHandle, ThreadStore};
pub use tools::{builtin_registry, CodeEditTool, ReadFileTool, ToolDispatcher};
