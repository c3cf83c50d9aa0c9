//! Run Controller Integration Tests
//!
//! Covers the run lifecycle end to end:
//! - Tool calls folded into the step and answered in order
//! - Finish function restriction on the last iteration
//! - Iteration budget exhaustion
//! - Run-fatal failures recorded as an error status
//! - Repair of an interrupted step by the next run

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use stepwise::models::step::{ToolUseResponse, INTERRUPTED_TEXT};
use stepwise::models::thread::{AgentStatus, Thread};
use stepwise::services::orchestrator::{finish_function_schema, TIMED_OUT_TEXT};
use stepwise::services::tools::{builtin_registry, ReadFileTool};
use stepwise::{AgentError, AgentRunController, RunOptions, Step};
use stepwise_llm::types::{FunctionCall, LlmError, TaggedMessage};
use stepwise_llm::ScriptedClient;
use stepwise_tools::ToolRegistry;

// ============================================================================
// Helpers
// ============================================================================

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "first\nsecond").unwrap();
    dir
}

fn options(dir: &TempDir) -> RunOptions {
    RunOptions::default().with_working_directory(dir.path())
}

fn read_call(id: &str) -> FunctionCall {
    FunctionCall::new("read_file", json!({"path": "a.txt"})).with_id(id)
}

fn function_names(client: &ScriptedClient, request: usize) -> Vec<String> {
    client.requests()[request]
        .functions
        .iter()
        .map(|f| f.name.clone())
        .collect()
}

// ============================================================================
// Tool Use
// ============================================================================

#[tokio::test]
async fn test_tool_call_then_answer() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_call_turn("Let me look.", vec![read_call("c1")])
        .with_text_turn("The file has two lines.");

    let result = controller
        .send(
            TaggedMessage::user("What is in a.txt?"),
            &client,
            &builtin_registry(),
            &options(&dir),
        )
        .await
        .unwrap();
    assert!(result.is_none());

    let thread = controller.thread().await;
    assert_eq!(thread.status, AgentStatus::Idle);
    let step = &thread.steps[0];
    assert!(step.is_complete());
    assert_eq!(step.tool_use_loop.len(), 1);
    match &step.tool_use_loop[0].response {
        Some(ToolUseResponse::Computer(responses)) => {
            assert_eq!(responses.len(), 1);
            assert_eq!(responses[0].id.as_deref(), Some("c1"));
            assert!(responses[0].text.contains("first\nsecond"));
        }
        other => panic!("unexpected response {:?}", other),
    }
    assert_eq!(
        step.assistant_message_for_user.as_ref().unwrap().text(),
        "The file has two lines."
    );

    // The second request replays the call and its response
    let second = &client.requests()[1];
    assert!(second.messages.iter().any(|m| !m.function_responses.is_empty()));
    assert!(function_names(&client, 0).contains(&"read_file".to_string()));
}

#[tokio::test]
async fn test_tool_context_reaches_system_prompt() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new().with_text_turn("ok");

    controller
        .send(
            TaggedMessage::user("hi"),
            &client,
            &builtin_registry(),
            &options(&dir),
        )
        .await
        .unwrap();

    let system = client.requests()[0].messages[0].text();
    assert!(system.contains("## Editing Files"));
    assert!(system.contains(&format!("You are working in {}", dir.path().display())));
    assert!(!system.contains("{{tool_context}}"));
}

// ============================================================================
// Finish Function and Budget
// ============================================================================

#[tokio::test]
async fn test_last_iteration_only_offers_finish_function() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_call_turn("", vec![read_call("c1")])
        .with_call_turn(
            "",
            vec![FunctionCall::new("finish", json!({"result": "two lines"})).with_id("f1")],
        );
    let options = options(&dir)
        .with_max_iterations(2)
        .with_finish_function(finish_function_schema("finish"));

    let result = controller
        .send(TaggedMessage::user("count"), &client, &builtin_registry(), &options)
        .await
        .unwrap();
    assert_eq!(result, Some(json!({"result": "two lines"})));

    let first = function_names(&client, 0);
    assert!(first.contains(&"read_file".to_string()));
    assert!(first.contains(&"finish".to_string()));
    assert_eq!(function_names(&client, 1), vec!["finish".to_string()]);

    let thread = controller.thread().await;
    assert_eq!(thread.status, AgentStatus::Idle);
    assert!(thread.steps[0].is_complete());
}

#[tokio::test]
async fn test_budget_exhaustion_times_out() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_fallback(ScriptedClient::call_turn("", vec![read_call("c")]));
    let registry = ToolRegistry::new().with_tool(Arc::new(ReadFileTool::new()));

    let result = controller
        .send(
            TaggedMessage::user("loop forever"),
            &client,
            &registry,
            &options(&dir).with_max_iterations(3),
        )
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(client.request_count(), 3);

    let thread = controller.thread().await;
    assert_eq!(thread.status, AgentStatus::Idle);
    let step = &thread.steps[0];
    assert_eq!(step.tool_use_loop.len(), 3);
    assert!(step.is_complete());
    assert_eq!(
        step.assistant_message_for_user.as_ref().unwrap().text(),
        TIMED_OUT_TEXT
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_unknown_tool_stops_with_error() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new().with_call_turn(
        "",
        vec![FunctionCall::new("launch_rockets", json!({})).with_id("x")],
    );

    let result = controller
        .send(TaggedMessage::user("go"), &client, &builtin_registry(), &options(&dir))
        .await;
    match result {
        Err(AgentError::UnknownToolName(name)) => assert_eq!(name, "launch_rockets"),
        other => panic!("expected UnknownToolName, got {:?}", other),
    }

    let thread = controller.thread().await;
    match &thread.status {
        AgentStatus::StoppedWithError { message } => assert!(message.contains("launch_rockets")),
        other => panic!("expected error status, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_error_stops_with_error() {
    let controller = AgentRunController::default();
    let client = ScriptedClient::new().with_turn(vec![
        Ok(TaggedMessage::assistant("partial")),
        Err(LlmError::NetworkError {
            message: "connection reset".to_string(),
        }),
    ]);

    let result = controller
        .send(
            TaggedMessage::user("hi"),
            &client,
            &ToolRegistry::new(),
            &RunOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(AgentError::Transport(_))));
    assert!(matches!(
        controller.thread().await.status,
        AgentStatus::StoppedWithError { .. }
    ));
}

#[tokio::test]
async fn test_next_run_repairs_failed_step() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let failing = ScriptedClient::new().with_call_turn(
        "",
        vec![FunctionCall::new("launch_rockets", json!({})).with_id("x")],
    );
    let _ = controller
        .send(TaggedMessage::user("go"), &failing, &builtin_registry(), &options(&dir))
        .await;

    let client = ScriptedClient::new().with_text_turn("Sorry about that.");
    controller
        .send(TaggedMessage::user("again"), &client, &builtin_registry(), &options(&dir))
        .await
        .unwrap();

    let thread = controller.thread().await;
    assert_eq!(thread.status, AgentStatus::Idle);
    assert_eq!(thread.steps.len(), 2);
    assert!(thread.steps.iter().all(Step::is_complete));

    let repaired = &thread.steps[0];
    match &repaired.tool_use_loop[0].response {
        Some(ToolUseResponse::Computer(responses)) => {
            assert_eq!(responses[0].text, INTERRUPTED_TEXT)
        }
        other => panic!("unexpected response {:?}", other),
    }
    assert_eq!(
        repaired.assistant_message_for_user.as_ref().unwrap().text(),
        INTERRUPTED_TEXT
    );

    // The repaired history is what the model sees
    let messages = &client.requests()[0].messages;
    assert!(messages.iter().any(|m| m.function_responses.len() == 1));
}

#[tokio::test]
async fn test_busy_thread_rejects_send_without_mutation() {
    let mut thread = Thread::with_id("busy");
    thread.status = AgentStatus::Paused {
        run_id: "someone-else".to_string(),
    };
    let controller = AgentRunController::for_thread(thread.clone());
    let client = ScriptedClient::new().with_text_turn("never");

    let result = controller
        .send(
            TaggedMessage::user("hi"),
            &client,
            &ToolRegistry::new(),
            &RunOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(AgentError::AlreadyRunning)));
    assert_eq!(controller.thread().await, thread);
    assert_eq!(client.request_count(), 0);
}
