//! Pause and Cancellation Integration Tests
//!
//! A gated transport holds the run inside its completion stream so the test
//! can act on the thread while the run is live:
//! - A second send is rejected while the first is running
//! - Pausing holds back writes until the run is resumed
//! - Cancelling unwinds the run and leaves the thread idle

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Notify;

use stepwise::models::thread::AgentStatus;
use stepwise::{AgentError, AgentRunController, RunOptions};
use stepwise_llm::types::{FunctionSchema, LlmError, LlmResult, TaggedMessage};
use stepwise_llm::{CompletionClient, PartialMessageStream, ScriptedClient};
use stepwise_tools::ToolRegistry;

// ============================================================================
// Helpers
// ============================================================================

/// Streams one chunk, then waits for the gate before streaming the answer.
struct GatedClient {
    started: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedClient {
    fn new() -> Self {
        Self {
            started: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl CompletionClient for GatedClient {
    fn name(&self) -> &str {
        "gated"
    }

    fn model(&self) -> &str {
        "gated"
    }

    async fn stream_completion(
        &self,
        _messages: Vec<TaggedMessage>,
        _functions: Vec<FunctionSchema>,
    ) -> LlmResult<PartialMessageStream> {
        let started = self.started.clone();
        let gate = self.gate.clone();
        let first = stream::once(async { Ok::<_, LlmError>(TaggedMessage::assistant("Thinking")) });
        let rest = stream::once(async move {
            started.notify_one();
            gate.notified().await;
            Ok(TaggedMessage::assistant("Thinking done"))
        });
        Ok(first.chain(rest).boxed())
    }
}

fn final_text(thread: &stepwise::Thread) -> Option<String> {
    thread.steps[0]
        .assistant_message_for_user
        .as_ref()
        .map(|m| m.text())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_second_send_is_rejected_while_running() {
    let controller = AgentRunController::default();
    let client = GatedClient::new();
    let registry = ToolRegistry::new();
    let options = RunOptions::default();

    let run = controller.send(TaggedMessage::user("first"), &client, &registry, &options);
    let driver = async {
        client.started.notified().await;
        let before = controller.thread().await;
        assert!(before.status.is_busy());

        let other = ScriptedClient::new().with_text_turn("never");
        let second = controller
            .send(TaggedMessage::user("second"), &other, &registry, &options)
            .await;
        assert!(matches!(second, Err(AgentError::AlreadyRunning)));
        assert_eq!(controller.thread().await, before);
        assert_eq!(other.request_count(), 0);

        client.gate.notify_one();
    };

    let (result, ()) = tokio::join!(run, driver);
    assert!(result.unwrap().is_none());

    let thread = controller.thread().await;
    assert_eq!(thread.status, AgentStatus::Idle);
    assert_eq!(thread.steps.len(), 1);
    assert_eq!(final_text(&thread).as_deref(), Some("Thinking done"));
}

#[tokio::test]
async fn test_pause_holds_writes_until_unpause() {
    let controller = AgentRunController::default();
    let client = GatedClient::new();
    let registry = ToolRegistry::new();
    let options = RunOptions::default();

    let run = controller.send(TaggedMessage::user("go"), &client, &registry, &options);
    let driver = async {
        client.started.notified().await;
        assert!(controller.pause().await);
        assert!(controller.thread().await.status.is_paused());

        // The answer chunk arrives but is not written while paused
        client.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let paused = controller.thread().await;
        assert_eq!(final_text(&paused).as_deref(), Some("Thinking"));

        assert!(controller.unpause().await);
    };

    let (result, ()) = tokio::join!(run, driver);
    assert!(result.unwrap().is_none());

    let thread = controller.thread().await;
    assert_eq!(thread.status, AgentStatus::Idle);
    assert_eq!(final_text(&thread).as_deref(), Some("Thinking done"));
}

#[tokio::test]
async fn test_cancel_unwinds_run_and_frees_thread() {
    let controller = AgentRunController::default();
    let client = GatedClient::new();
    let registry = ToolRegistry::new();
    let options = RunOptions::default();

    let run = controller.send(TaggedMessage::user("go"), &client, &registry, &options);
    let driver = async {
        client.started.notified().await;
        assert!(controller.cancel().await);
        assert_eq!(controller.thread().await.status, AgentStatus::Idle);
        assert!(!controller.cancel().await);
    };

    let (result, ()) = tokio::join!(run, driver);
    assert!(matches!(result, Err(AgentError::Cancelled)));

    let thread = controller.thread().await;
    assert_eq!(thread.status, AgentStatus::Idle);
    assert_eq!(final_text(&thread).as_deref(), Some("Thinking"));

    let next = ScriptedClient::new().with_text_turn("Back again.");
    controller
        .send(TaggedMessage::user("retry"), &next, &registry, &options)
        .await
        .unwrap();
    let thread = controller.thread().await;
    assert_eq!(thread.steps.len(), 2);
    assert!(thread.steps.iter().all(|s| s.is_complete()));
    assert_eq!(
        thread.steps[1].assistant_message_for_user.as_ref().unwrap().text(),
        "Back again."
    );
}

#[tokio::test]
async fn test_cancel_while_paused_releases_run() {
    let controller = AgentRunController::default();
    let client = GatedClient::new();
    let registry = ToolRegistry::new();
    let options = RunOptions::default();

    let run = controller.send(TaggedMessage::user("go"), &client, &registry, &options);
    let driver = async {
        client.started.notified().await;
        assert!(controller.pause().await);
        client.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(controller.cancel().await);
    };

    let (result, ()) = tokio::join!(run, driver);
    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert_eq!(controller.thread().await.status, AgentStatus::Idle);
}
