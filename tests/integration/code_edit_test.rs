//! Code Edit Integration Tests
//!
//! Fenced edit commands in assistant prose are claimed by the code edit tool
//! as a pseudo-function, applied to the workspace, and reported back to the
//! model before it answers.

use std::path::Path;

use tempfile::TempDir;

use stepwise::models::step::ToolUseResponse;
use stepwise::services::tools::builtin_registry;
use stepwise::{AgentRunController, RunOptions};
use stepwise_llm::types::{ContentItem, Role, TaggedMessage};
use stepwise_llm::ScriptedClient;

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.txt"), "alpha\nbeta\ngamma").unwrap();
    dir
}

fn read(dir: &TempDir, name: &str) -> String {
    std::fs::read_to_string(dir.path().join(name)).unwrap()
}

fn snippet_count(messages: &[TaggedMessage], path: &Path) -> usize {
    messages
        .iter()
        .flat_map(|m| m.content.iter())
        .filter(|item| matches!(item, ContentItem::FileSnippet(s) if s.path == path))
        .count()
}

#[tokio::test]
async fn test_prose_edit_is_applied_and_reported() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_text_turn("I'll create it.\n%%%\n> Write notes/hello.txt\nhello world\n%%%")
        .with_text_turn("Created notes/hello.txt.");
    let options = RunOptions::default().with_working_directory(dir.path());

    let result = controller
        .send(TaggedMessage::user("write hello"), &client, &builtin_registry(), &options)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(read(&dir, "notes/hello.txt"), "hello world");

    let thread = controller.thread().await;
    let step = &thread.steps[0];
    assert!(step.is_complete());
    assert_eq!(step.tool_use_loop.len(), 1);
    assert!(step.tool_use_loop[0]
        .initial_response
        .text()
        .contains("> Write notes/hello.txt"));
    assert!(matches!(
        step.tool_use_loop[0].response,
        Some(ToolUseResponse::PseudoFunction(_))
    ));
    assert_eq!(
        step.assistant_message_for_user.as_ref().unwrap().text(),
        "Created notes/hello.txt."
    );

    // The result reaches the model as a user message
    let second = &client.requests()[1].messages;
    let report = second
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .unwrap();
    assert!(report.text().contains("Created notes/hello.txt (+1 -0)"));
}

#[tokio::test]
async fn test_bad_edit_is_reported_and_run_continues() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_text_turn("%%%\n> Replace lib.txt:5-6\nzeta\n%%%")
        .with_text_turn("%%%\n> Replace lib.txt:1\nBETA\n%%%")
        .with_text_turn("Fixed.");
    let options = RunOptions::default().with_working_directory(dir.path());

    controller
        .send(TaggedMessage::user("edit"), &client, &builtin_registry(), &options)
        .await
        .unwrap();
    assert_eq!(read(&dir, "lib.txt"), "alpha\nBETA\ngamma");

    let thread = controller.thread().await;
    let step = &thread.steps[0];
    assert_eq!(step.tool_use_loop.len(), 2);
    match &step.tool_use_loop[0].response {
        Some(ToolUseResponse::PseudoFunction(items)) => {
            let text = items[0].render_text().unwrap();
            assert!(text.starts_with("Failed to apply edits"));
            assert!(text.contains("lib.txt"));
        }
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_newer_file_context_supersedes_older() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_text_turn("%%%\n> Append lib.txt\ndelta\n%%%")
        .with_text_turn("%%%\n> FindReplace lib.txt\ndelta\n===WITH===\nepsilon\n%%%")
        .with_text_turn("Done.");
    let options = RunOptions::default().with_working_directory(dir.path());

    controller
        .send(TaggedMessage::user("edit twice"), &client, &builtin_registry(), &options)
        .await
        .unwrap();
    assert_eq!(read(&dir, "lib.txt"), "alpha\nbeta\ngamma\nepsilon");

    let path = dir.path().join("lib.txt");
    let requests = client.requests();
    assert_eq!(snippet_count(&requests[1].messages, &path), 1);
    // Both edit results are in the history, but only the newest snapshot is sent
    assert_eq!(snippet_count(&requests[2].messages, &path), 1);

    let thread = controller.thread().await;
    let stored: usize = thread.steps[0]
        .tool_use_loop
        .iter()
        .filter_map(|round| match &round.response {
            Some(ToolUseResponse::PseudoFunction(items)) => Some(items),
            _ => None,
        })
        .flatten()
        .filter(|item| matches!(item, ContentItem::FileSnippet(_)))
        .count();
    assert_eq!(stored, 2);
}

#[tokio::test]
async fn test_out_of_bounds_line_numbers_leave_thread_usable() {
    let dir = workspace();
    let controller = AgentRunController::default();
    let client = ScriptedClient::new()
        .with_text_turn("%%%\n> Replace lib.txt:0-18446744073709551615\nx\n%%%")
        .with_text_turn("%%%\n> Replace lib.txt:1-18446744073709551615\nx\n%%%")
        .with_text_turn("Giving up.");
    let options = RunOptions::default().with_working_directory(dir.path());

    controller
        .send(TaggedMessage::user("edit"), &client, &builtin_registry(), &options)
        .await
        .unwrap();
    assert_eq!(read(&dir, "lib.txt"), "alpha\nbeta\ngamma");

    let thread = controller.thread().await;
    assert_eq!(thread.status, stepwise::AgentStatus::Idle);
    for round in &thread.steps[0].tool_use_loop {
        match &round.response {
            Some(ToolUseResponse::PseudoFunction(items)) => {
                assert!(items[0].render_text().unwrap().starts_with("Failed to apply edits"))
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    let next = ScriptedClient::new().with_text_turn("Still here.");
    controller
        .send(TaggedMessage::user("again"), &next, &builtin_registry(), &options)
        .await
        .unwrap();
    assert_eq!(controller.thread().await.steps.len(), 2);
}
