//! Tool Trait and Registry
//!
//! Defines the `Tool` collaborator contract and the ordered `ToolRegistry`.
//!
//! A tool can act in two ways:
//! - structured: it advertises `functions()` and answers `handle_call`
//! - pseudo-function: it claims assistant prose via
//!   `can_handle_pseudo_function` and acts on it in `handle_pseudo_function`
//!
//! Both hooks return `Option`: `None` means "not mine", which lets the
//! dispatcher ask the next tool in registration order.

use std::sync::Arc;

use async_trait::async_trait;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::{FunctionCall, FunctionSchema};

use crate::executor::{PseudoFunctionOutput, ToolResult};

/// Unified tool interface.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool, used for logging and registry identity
    fn name(&self) -> &str;

    /// Functions this tool exposes to the model
    fn functions(&self) -> Vec<FunctionSchema> {
        Vec::new()
    }

    /// Handle a structured function call.
    ///
    /// Returns `None` when the call is not addressed to this tool. Failures
    /// the model can recover from are returned as `ToolResult::err`.
    async fn handle_call(&self, call: &FunctionCall, ctx: &ToolContext) -> Option<ToolResult>;

    /// Whether this tool interprets `text` as an action.
    fn can_handle_pseudo_function(&self, _text: &str) -> bool {
        false
    }

    /// Act on assistant prose previously claimed by `can_handle_pseudo_function`.
    async fn handle_pseudo_function(
        &self,
        _text: &str,
        _ctx: &ToolContext,
    ) -> Option<PseudoFunctionOutput> {
        None
    }

    /// Text inserted into the system prompt at the start of every run.
    async fn context_to_insert_at_beginning_of_thread(&self, _ctx: &ToolContext) -> Option<String> {
        None
    }
}

/// Registry of available tools.
///
/// Iteration order is registration order; dispatch is first-match-wins, so
/// the order is part of the registry's behavior.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Builder-style registration
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Unregister a tool by name. Returns the removed tool, or None if not found.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        let index = self.tools.iter().position(|t| t.name() == name)?;
        Some(self.tools.remove(index))
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    /// All function schemas, in registration order.
    pub fn functions(&self) -> Vec<FunctionSchema> {
        self.tools.iter().flat_map(|t| t.functions()).collect()
    }

    /// First tool that claims `text` as a pseudo-function.
    pub fn pseudo_function_handler(&self, text: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.can_handle_pseudo_function(text))
            .cloned()
    }

    /// Get all registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
