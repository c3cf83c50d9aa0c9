//! Tool Execution Result Types
//!
//! Portable result types produced by tools and folded into the step history
//! by the dispatch layer.

use serde::{Deserialize, Serialize};

use stepwise_llm::types::{ContentItem, FunctionCall, FunctionResponse};

/// Result of one structured function call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution was successful
    pub success: bool,
    /// Output from the tool (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Log lines describing what the tool did, keyed to the call by the dispatcher
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            logs: Vec::new(),
        }
    }

    /// Create an error result
    ///
    /// Errors are handed back to the model as text so it can correct itself.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            logs: Vec::new(),
        }
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    /// Convert to string for model consumption
    pub fn to_content(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }

    /// Build the function response answering `call`.
    pub fn to_response(&self, call: &FunctionCall) -> FunctionResponse {
        FunctionResponse::for_call(call, self.to_content())
    }
}

/// Result of handling a pseudo-function (an action inferred from prose)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PseudoFunctionOutput {
    /// Result content handed back to the model
    pub items: Vec<ContentItem>,
    /// Log lines describing what the tool did
    #[serde(default)]
    pub logs: Vec<String>,
}

impl PseudoFunctionOutput {
    /// Output consisting of a single text item
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            items: vec![ContentItem::text(text)],
            logs: Vec::new(),
        }
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }
}
