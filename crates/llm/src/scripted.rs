//! Scripted Completion Client
//!
//! A deterministic `CompletionClient` that replays queued turns. Each turn is
//! a list of partial messages (or transport errors) streamed in order. Every
//! request is recorded so callers can inspect the exact prompt and function
//! set the run controller sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::provider::{CompletionClient, PartialMessageStream};
use crate::types::{FunctionCall, FunctionSchema, LlmError, LlmResult, TaggedMessage};

/// One scripted model turn: the sequence of partial messages to stream.
pub type ScriptedTurn = Vec<LlmResult<TaggedMessage>>;

/// A request observed by the scripted client.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<TaggedMessage>,
    pub functions: Vec<FunctionSchema>,
}

pub struct ScriptedClient {
    model: String,
    function_calling: bool,
    turns: Mutex<VecDeque<ScriptedTurn>>,
    fallback: Option<ScriptedTurn>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            function_calling: true,
            turns: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a turn.
    pub fn with_turn(self, turn: ScriptedTurn) -> Self {
        self.turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(turn);
        self
    }

    /// Queue a plain-text turn streamed line by line.
    pub fn with_text_turn(self, text: &str) -> Self {
        self.with_turn(Self::text_turn(text))
    }

    /// Queue a turn that ends with the given function calls.
    pub fn with_call_turn(self, text: &str, calls: Vec<FunctionCall>) -> Self {
        self.with_turn(Self::call_turn(text, calls))
    }

    /// Turn replayed whenever the queue is empty.
    pub fn with_fallback(mut self, turn: ScriptedTurn) -> Self {
        self.fallback = Some(turn);
        self
    }

    /// Declare that the model has no native function calling.
    pub fn without_function_calling(mut self) -> Self {
        self.function_calling = false;
        self
    }

    /// Build a text turn whose partial messages grow one line at a time.
    pub fn text_turn(text: &str) -> ScriptedTurn {
        let mut turn = Vec::new();
        let mut accumulated = String::new();
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                accumulated.push('\n');
            }
            accumulated.push_str(line);
            turn.push(Ok(TaggedMessage::assistant(accumulated.clone())));
        }
        turn
    }

    /// Build a turn that streams `text` and then attaches `calls`.
    pub fn call_turn(text: &str, calls: Vec<FunctionCall>) -> ScriptedTurn {
        let mut turn = if text.is_empty() {
            Vec::new()
        } else {
            Self::text_turn(text)
        };
        turn.push(Ok(TaggedMessage::assistant_with_calls(text, calls)));
        turn
    }

    /// All requests observed so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_function_calling(&self) -> bool {
        self.function_calling
    }

    async fn stream_completion(
        &self,
        messages: Vec<TaggedMessage>,
        functions: Vec<FunctionSchema>,
    ) -> LlmResult<PartialMessageStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(CompletionRequest {
                messages,
                functions,
            });

        let next = self
            .turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let turn = match next.or_else(|| self.fallback.clone()) {
            Some(turn) => turn,
            None => {
                return Err(LlmError::ProviderUnavailable {
                    message: "scripted client has no turns left".to_string(),
                })
            }
        };
        tracing::trace!(chunks = turn.len(), "[ScriptedClient] streaming turn");
        Ok(stream::iter(turn).boxed())
    }
}
