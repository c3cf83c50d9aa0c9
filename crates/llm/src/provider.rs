//! Completion Transport Trait
//!
//! Defines the interface every completion transport implements.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::types::{FunctionSchema, LlmResult, TaggedMessage};

/// Stream of partial assistant messages.
///
/// Every item is the assistant message accumulated so far in the current
/// turn, so a consumer can replace its provisional state with each item
/// instead of merging deltas. The final item may carry function calls.
pub type PartialMessageStream = BoxStream<'static, LlmResult<TaggedMessage>>;

/// Trait that all completion transports must implement.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the transport name for identification.
    fn name(&self) -> &str;

    /// Returns the model being used.
    fn model(&self) -> &str;

    /// Whether the model accepts structured function definitions.
    ///
    /// When false, the run controller embeds a textual function manifest in
    /// the system prompt and extracts `<function>` spans from the output.
    fn supports_function_calling(&self) -> bool {
        true
    }

    /// Start streaming a completion.
    ///
    /// # Arguments
    /// * `messages` - Full outbound prompt, system message first
    /// * `functions` - Functions the model may call this turn
    async fn stream_completion(
        &self,
        messages: Vec<TaggedMessage>,
        functions: Vec<FunctionSchema>,
    ) -> LlmResult<PartialMessageStream>;
}
