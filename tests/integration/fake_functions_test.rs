//! Fake Function Integration Tests
//!
//! Models without native function calling get a textual manifest in the
//! system prompt and write `<function>name(args)</function>` spans. The run
//! loop lifts the spans into structured calls and replays the traffic as
//! text on the next request.

use serde_json::json;
use tempfile::TempDir;

use stepwise::models::settings::FunctionCallingMode;
use stepwise::models::step::ToolUseResponse;
use stepwise::services::orchestrator::finish_function_schema;
use stepwise::services::tools::builtin_registry;
use stepwise::{AgentRunController, RunOptions};
use stepwise_llm::types::{Role, TaggedMessage};
use stepwise_llm::ScriptedClient;

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hi there").unwrap();
    dir
}

#[tokio::test]
async fn test_spans_become_calls_and_results_become_text() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .without_function_calling()
        .with_text_turn("Reading.\n<function>read_file({\"path\": \"a.txt\"})</function>")
        .with_text_turn("It says hi.");
    let options = RunOptions::default().with_working_directory(dir.path());

    controller
        .send(TaggedMessage::user("read a.txt"), &client, &builtin_registry(), &options)
        .await
        .unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 2);

    // No structured functions on the wire; the manifest is in the prompt
    assert!(requests[0].functions.is_empty());
    let system = requests[0].messages[0].text();
    assert!(system.starts_with("## Function Calling"));
    assert!(system.contains("### read_file"));
    assert!(system.contains("### apply_code_edits"));

    // The span was lifted into a structured call before reaching the step
    let thread = controller.thread().await;
    let round = &thread.steps[0].tool_use_loop[0];
    assert_eq!(round.initial_response.function_calls.len(), 1);
    assert_eq!(round.initial_response.function_calls[0].name, "read_file");
    assert_eq!(
        round.initial_response.function_calls[0]
            .parsed_arguments()
            .unwrap(),
        json!({"path": "a.txt"})
    );
    assert!(!round.initial_response.text().contains("<function>"));
    assert!(matches!(round.response, Some(ToolUseResponse::Computer(_))));

    // The replayed history carries no structured traffic
    let second = &requests[1].messages;
    assert!(second.iter().all(|m| m.role != Role::Function));
    assert!(second.iter().all(|m| m.function_calls.is_empty()));
    assert!(second
        .iter()
        .any(|m| m.role == Role::Assistant && m.text().contains("<function>read_file(")));
    assert!(second.iter().any(|m| m.role == Role::User
        && m.text().contains("<function_result name=\"read_file\">")
        && m.text().contains("hi there")));
}

#[tokio::test]
async fn test_forced_fake_mode_with_finish_function() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_text_turn("<function>finish({\"result\": \"done\"})</function>");
    let options = RunOptions::default()
        .with_working_directory(dir.path())
        .with_function_calling(FunctionCallingMode::FakeFunctions)
        .with_finish_function(finish_function_schema("finish"))
        .with_max_iterations(1);

    let result = controller
        .send(TaggedMessage::user("finish up"), &client, &builtin_registry(), &options)
        .await
        .unwrap();
    assert_eq!(result, Some(json!({"result": "done"})));

    // Only the finish function is offered on the last iteration
    let system = client.requests()[0].messages[0].text();
    assert!(system.contains("### finish"));
    assert!(!system.contains("### read_file"));
}
