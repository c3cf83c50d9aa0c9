//! Step Models
//!
//! One user-request-to-final-answer cycle (`Step`) and the tool-use rounds
//! inside it (`ToolUseStep`).
//!
//! A step is complete when it has a final assistant message and every
//! tool-use round has been answered. Incomplete steps come from interrupted
//! runs and are repaired with `fix_if_incomplete` before being replayed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stepwise_llm::types::{ContentItem, FunctionCall, FunctionResponse, Role, TaggedMessage};

/// Text synthesized for anything an interrupted run left unanswered.
pub const INTERRUPTED_TEXT: &str = "[Response was interrupted]";

/// Log key for pseudo-function activity in `ToolUseStep::logs`.
pub const PSEUDO_FUNCTION_LOG_KEY: &str = "pseudo_function";

/// The answer to one tool-use round.
///
/// Exactly one kind is ever recorded, so the two are a sum type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum ToolUseResponse {
    /// Responses to structured function calls, in call order
    Computer(Vec<FunctionResponse>),
    /// Result content of a pseudo-function
    PseudoFunction(Vec<ContentItem>),
}

impl ToolUseResponse {
    /// Message replaying this response to the model.
    pub fn to_message(&self) -> TaggedMessage {
        match self {
            ToolUseResponse::Computer(responses) => {
                TaggedMessage::function_responses(responses.clone())
            }
            ToolUseResponse::PseudoFunction(items) => TaggedMessage::new(Role::User, items.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ToolUseResponse::Computer(responses) => responses.is_empty(),
            ToolUseResponse::PseudoFunction(items) => items.is_empty(),
        }
    }
}

/// One round of the model invoking tools and receiving their results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseStep {
    /// The model message with function calls, or prose claimed as a pseudo-function
    pub initial_response: TaggedMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ToolUseResponse>,
    /// Tool log lines keyed by call id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub logs: BTreeMap<String, Vec<String>>,
}

impl ToolUseStep {
    pub fn new(initial_response: TaggedMessage) -> Self {
        Self {
            initial_response,
            response: None,
            logs: BTreeMap::new(),
        }
    }

    /// A round is answered once it holds a non-empty response.
    pub fn is_complete(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|response| !response.is_empty())
    }

    /// Function calls still waiting for responses.
    pub fn pending_function_calls(&self) -> &[FunctionCall] {
        if self.is_complete() {
            &[]
        } else {
            &self.initial_response.function_calls
        }
    }

    /// Append log lines under `key`.
    pub fn add_logs(&mut self, key: impl Into<String>, lines: impl IntoIterator<Item = String>) {
        let entry = self.logs.entry(key.into()).or_default();
        entry.extend(lines);
    }

    /// Record the interrupted marker as this round's response.
    fn fix_if_incomplete(&mut self) {
        if self.is_complete() {
            return;
        }
        let response = if self.initial_response.has_function_calls() {
            ToolUseResponse::Computer(
                self.initial_response
                    .function_calls
                    .iter()
                    .map(|call| FunctionResponse::for_call(call, INTERRUPTED_TEXT))
                    .collect(),
            )
        } else {
            ToolUseResponse::PseudoFunction(vec![ContentItem::text(INTERRUPTED_TEXT)])
        };
        self.response = Some(response);
    }
}

/// One user request and everything the agent did to answer it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    /// The user message that opened this step
    pub initial_request: TaggedMessage,
    #[serde(default)]
    pub tool_use_loop: Vec<ToolUseStep>,
    /// Final reply, carrying no function calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_message_for_user: Option<TaggedMessage>,
}

impl Step {
    /// Open a step for a user request with a fresh id.
    pub fn new(initial_request: TaggedMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            initial_request,
            tool_use_loop: Vec::new(),
            assistant_message_for_user: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.assistant_message_for_user.is_some()
            && self.tool_use_loop.iter().all(ToolUseStep::is_complete)
    }

    pub fn last_tool_use_step(&self) -> Option<&ToolUseStep> {
        self.tool_use_loop.last()
    }

    pub fn last_tool_use_step_mut(&mut self) -> Option<&mut ToolUseStep> {
        self.tool_use_loop.last_mut()
    }

    /// Calls of the last tool-use round, if it has not been answered yet.
    pub fn pending_function_calls_to_execute(&self) -> Vec<FunctionCall> {
        self.last_tool_use_step()
            .map(|step| step.pending_function_calls().to_vec())
            .unwrap_or_default()
    }

    /// Fold one streamed partial message into the step.
    ///
    /// A message with function calls replaces the open tool-use round (or
    /// opens a new one) and clears any provisional final answer. A message
    /// without calls becomes the provisional final answer.
    pub fn append_or_update_partial_response(&mut self, message: TaggedMessage) {
        if !message.has_function_calls() {
            self.assistant_message_for_user = Some(message);
            return;
        }

        self.assistant_message_for_user = None;
        match self.tool_use_loop.last_mut() {
            Some(open) if !open.is_complete() => open.initial_response = message,
            _ => self.tool_use_loop.push(ToolUseStep::new(message)),
        }
    }

    /// Answer everything left open by an interrupted run.
    pub fn fix_if_incomplete(&mut self) {
        for tool_use in &mut self.tool_use_loop {
            tool_use.fix_if_incomplete();
        }
        if self.assistant_message_for_user.is_none() {
            self.assistant_message_for_user = Some(TaggedMessage::assistant(INTERRUPTED_TEXT));
        }
    }

    /// The step as a message sequence, in conversation order.
    pub fn messages(&self) -> Vec<TaggedMessage> {
        let mut messages = vec![self.initial_request.clone()];
        for tool_use in &self.tool_use_loop {
            messages.push(tool_use.initial_response.clone());
            if let Some(response) = &tool_use.response {
                messages.push(response.to_message());
            }
        }
        if let Some(final_message) = &self.assistant_message_for_user {
            messages.push(final_message.clone());
        }
        messages
    }
}
