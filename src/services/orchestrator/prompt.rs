//! Prompt Assembly
//!
//! Builds the outbound message list of one iteration from the step history:
//! system prompt, prefix-stable compaction of old steps, then elision of file
//! context that later context supersedes.

use std::path::{Path, PathBuf};

use stepwise_llm::types::{ContentItem, FileSnippet, TaggedMessage};
use stepwise_tools::to_fake_function_messages;

use crate::models::settings::{CompactionSettings, TOOL_CONTEXT_MARKER};
use crate::models::step::Step;

/// Replaces the omitted middle of a compacted history
pub const OLD_MESSAGES_OMITTED: &str = "[Old messages omitted]";

/// Replaces a message whose file context was entirely superseded
pub const SUPERSEDED_CONTEXT: &str = "[File context omitted: superseded by a newer version below]";

/// Fill the template's tool-context marker and append the workspace notice.
///
/// Contexts are joined in the order given. A template without the marker
/// gets the contexts appended.
pub fn assemble_system_prompt(
    template: &str,
    contexts: &[String],
    working_directory: Option<&Path>,
) -> String {
    let tool_context = contexts
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = if template.contains(TOOL_CONTEXT_MARKER) {
        template.replace(TOOL_CONTEXT_MARKER, &tool_context)
    } else if tool_context.is_empty() {
        template.to_string()
    } else {
        format!("{}\n\n{}", template, tool_context)
    };
    prompt = prompt.trim_end().to_string();

    if let Some(dir) = working_directory {
        prompt.push_str(&format!(
            "\n\nYou are working in {}. Only read and modify files inside this directory.",
            dir.display()
        ));
    }
    prompt
}

/// First step index of the kept tail, or `None` when nothing is omitted.
///
/// The tail start only moves in whole chunks, so the prompt prefix stays
/// stable for `chunk_size` steps at a time.
fn tail_start(total: usize, settings: &CompactionSettings) -> Option<usize> {
    let keep = settings.keep_first_steps + settings.keep_last_steps;
    if total <= keep {
        return None;
    }
    let chunk = settings.chunk_size.max(1);
    let omittable = total - keep;
    let start = settings.keep_first_steps + (omittable / chunk) * chunk;
    (start > settings.keep_first_steps).then_some(start)
}

/// Messages of `steps`, with the middle collapsed into a marker.
pub fn compact_steps(steps: &[Step], settings: &CompactionSettings) -> Vec<TaggedMessage> {
    let Some(start) = tail_start(steps.len(), settings) else {
        return steps.iter().flat_map(Step::messages).collect();
    };

    tracing::debug!(
        omitted = start - settings.keep_first_steps,
        total = steps.len(),
        "[AgentRun] compacting old steps"
    );
    let mut messages: Vec<TaggedMessage> = steps[..settings.keep_first_steps]
        .iter()
        .flat_map(Step::messages)
        .collect();
    messages.push(TaggedMessage::user(OLD_MESSAGES_OMITTED));
    messages.extend(steps[start..].iter().flat_map(Step::messages));
    messages
}

/// File context seen later in the history
enum Coverage {
    Whole(PathBuf),
    Lines(FileSnippet),
}

impl Coverage {
    fn supersedes(&self, item: &ContentItem) -> bool {
        match (self, item) {
            (Coverage::Whole(path), ContentItem::FileSnippet(s)) => *path == s.path,
            (Coverage::Whole(path), ContentItem::Attachment { path: p, .. }) => path == p,
            (Coverage::Lines(later), ContentItem::FileSnippet(s)) => later.covers(s),
            (Coverage::Lines(later), ContentItem::Attachment { path, .. }) => {
                later.path == *path
                    && later.line_start == 0
                    && later.line_count == later.file_line_count
            }
            _ => false,
        }
    }

    fn of(item: &ContentItem) -> Option<Self> {
        match item {
            ContentItem::FileSnippet(s) => Some(Coverage::Lines(s.clone())),
            ContentItem::Attachment { path, .. } => Some(Coverage::Whole(path.clone())),
            _ => None,
        }
    }
}

/// Drop file snippets and attachments that later context already covers.
///
/// Walks the history newest first; the newest copy of any file range wins.
pub fn elide_redundant_context(mut messages: Vec<TaggedMessage>) -> Vec<TaggedMessage> {
    let mut seen: Vec<Coverage> = Vec::new();
    let mut elided = 0usize;

    for message in messages.iter_mut().rev() {
        let had_content = !message.content.is_empty();
        let mut kept: Vec<ContentItem> = Vec::with_capacity(message.content.len());

        for item in std::mem::take(&mut message.content).into_iter().rev() {
            if item.file_path().is_none() {
                kept.push(item);
                continue;
            }
            if seen.iter().any(|c| c.supersedes(&item)) {
                elided += 1;
                continue;
            }
            if let Some(coverage) = Coverage::of(&item) {
                seen.push(coverage);
            }
            kept.push(item);
        }
        kept.reverse();

        if had_content && kept.is_empty() && message.function_calls.is_empty() {
            kept.push(ContentItem::text(SUPERSEDED_CONTEXT));
        }
        message.content = kept;
    }

    if elided > 0 {
        tracing::debug!(elided, "[AgentRun] elided superseded file context");
    }
    messages
}

/// Full outbound prompt for one iteration.
pub fn build_prompt(
    system_prompt: &str,
    steps: &[Step],
    compaction: &CompactionSettings,
    fake_functions: bool,
) -> Vec<TaggedMessage> {
    let mut messages = vec![TaggedMessage::system(system_prompt)];
    messages.extend(elide_redundant_context(compact_steps(steps, compaction)));
    if fake_functions {
        to_fake_function_messages(messages)
    } else {
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::DEFAULT_SYSTEM_PROMPT_TEMPLATE;
    use stepwise_llm::types::{FunctionCall, Role};

    fn completed_step(n: usize) -> Step {
        let mut step = Step::new(TaggedMessage::user(format!("request {}", n)));
        step.append_or_update_partial_response(TaggedMessage::assistant(format!("answer {}", n)));
        step
    }

    fn snippet(path: &str, content: &str, start: usize, count: usize) -> ContentItem {
        ContentItem::FileSnippet(FileSnippet::capture(path, path, content, start, count))
    }

    #[test]
    fn test_assemble_replaces_marker() {
        let prompt = assemble_system_prompt(
            DEFAULT_SYSTEM_PROMPT_TEMPLATE,
            &["Tool A".to_string(), "".to_string(), "Tool B".to_string()],
            None,
        );
        assert!(prompt.ends_with("Tool A\n\nTool B"));
        assert!(!prompt.contains(TOOL_CONTEXT_MARKER));
    }

    #[test]
    fn test_assemble_appends_workspace_notice() {
        let prompt = assemble_system_prompt("Base", &[], Some(Path::new("/work")));
        assert_eq!(
            prompt,
            "Base\n\nYou are working in /work. Only read and modify files inside this directory."
        );
    }

    #[test]
    fn test_short_history_is_not_compacted() {
        let steps: Vec<Step> = (0..9).map(completed_step).collect();
        let messages = compact_steps(&steps, &CompactionSettings::default());
        assert_eq!(messages.len(), 18);
    }

    #[test]
    fn test_compaction_rounds_to_chunks() {
        let settings = CompactionSettings::default();
        // 1 + 8 kept, 3 extra steps: less than one chunk, nothing omitted
        assert_eq!(tail_start(12, &settings), None);
        // 4 extra steps: one chunk omitted
        assert_eq!(tail_start(13, &settings), Some(5));
        // The tail start stays put until another full chunk accumulates
        assert_eq!(tail_start(16, &settings), Some(5));
        assert_eq!(tail_start(17, &settings), Some(9));
    }

    #[test]
    fn test_compacted_history_keeps_head_and_tail() {
        let steps: Vec<Step> = (0..13).map(completed_step).collect();
        let messages = compact_steps(&steps, &CompactionSettings::default());

        assert_eq!(messages[0].text(), "request 0");
        assert_eq!(messages[1].text(), "answer 0");
        assert_eq!(messages[2].text(), OLD_MESSAGES_OMITTED);
        assert_eq!(messages[3].text(), "request 5");
        assert_eq!(messages.last().unwrap().text(), "answer 12");
        assert_eq!(messages.len(), 2 + 1 + 8 * 2);
    }

    #[test]
    fn test_later_snippet_supersedes_earlier() {
        let content = "0\n1\n2\n3\n4";
        let messages = vec![
            TaggedMessage::new(Role::User, vec![snippet("/w/a.rs", content, 1, 2)]),
            TaggedMessage::new(
                Role::User,
                vec![ContentItem::text("note"), snippet("/w/b.rs", content, 0, 5)],
            ),
            TaggedMessage::new(Role::User, vec![snippet("/w/a.rs", content, 0, 5)]),
        ];

        let elided = elide_redundant_context(messages);
        assert_eq!(elided[0].text(), SUPERSEDED_CONTEXT);
        assert_eq!(elided[1].content.len(), 2);
        assert!(matches!(elided[2].content[0], ContentItem::FileSnippet(_)));
    }

    #[test]
    fn test_partial_snippet_does_not_supersede_wider_one() {
        let content = "0\n1\n2\n3\n4";
        let messages = vec![
            TaggedMessage::new(Role::User, vec![snippet("/w/a.rs", content, 0, 5)]),
            TaggedMessage::new(Role::User, vec![snippet("/w/a.rs", content, 2, 1)]),
        ];
        let elided = elide_redundant_context(messages);
        assert!(matches!(elided[0].content[0], ContentItem::FileSnippet(_)));
    }

    #[test]
    fn test_attachment_supersedes_any_snippet_of_same_file() {
        let messages = vec![
            TaggedMessage::new(Role::User, vec![snippet("/w/a.rs", "x\ny", 0, 1)]),
            TaggedMessage::new(
                Role::User,
                vec![ContentItem::Attachment {
                    path: PathBuf::from("/w/a.rs"),
                    name: "a.rs".to_string(),
                    text: "x\ny".to_string(),
                }],
            ),
        ];
        let elided = elide_redundant_context(messages);
        assert_eq!(elided[0].text(), SUPERSEDED_CONTEXT);
    }

    #[test]
    fn test_build_prompt_fake_functions() {
        let mut step = Step::new(TaggedMessage::user("read it"));
        step.append_or_update_partial_response(TaggedMessage::assistant_with_calls(
            "",
            vec![FunctionCall::new("read_file", serde_json::json!({"path": "a"}))],
        ));

        let native = build_prompt("sys", &[step.clone()], &CompactionSettings::default(), false);
        assert_eq!(native.len(), 3);
        assert_eq!(native[0].role, Role::System);
        assert!(native[2].has_function_calls());

        let fake = build_prompt("sys", &[step], &CompactionSettings::default(), true);
        assert!(!fake[2].has_function_calls());
        assert!(fake[2].text().contains("<function>read_file("));
    }
}
