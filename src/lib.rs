//! Stepwise - Agent Runtime Library
//!
//! This library drives a tool-using language model through multi-step runs
//! on a conversation thread. It includes:
//! - Step and thread models with repair of interrupted runs
//! - The run controller with pause, resume and cancellation
//! - Tool dispatch with structured calls and pseudo-functions
//! - A fenced code-edit protocol with diff preview
//! - Settings and their JSON config file

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export commonly used items
pub use models::settings::{AgentSettings, SettingsUpdate};
pub use models::step::{Step, ToolUseResponse, ToolUseStep};
pub use models::thread::{AgentStatus, Thread};
pub use services::orchestrator::{AgentRunController, RunOptions};
pub use services::thread_store::ThreadStore;
pub use storage::config::ConfigService;
pub use utils::error::{AgentError, AgentResult};

