//! Prompt-Based Function Calling Fallback
//!
//! For models without native function calling, this module injects a textual
//! function manifest into the system prompt and converts between structured
//! function traffic and the embedded form:
//!
//! ```text
//! <function>read_file({"path": "src/main.rs"})</function>
//! <function_result name="read_file">...</function_result>
//! ```
//!
//! Outbound, structured calls and responses are re-serialized into text and
//! function-role messages become user messages. Inbound, every streamed
//! assistant message has its `<function>` spans lifted back into calls.

use serde::{Deserialize, Serialize};

use stepwise_llm::types::{
    ContentItem, FunctionCall, FunctionResponse, FunctionSchema, Role, TaggedMessage,
};

const FUNCTION_OPEN: &str = "<function>";
const FUNCTION_CLOSE: &str = "</function>";
const RESULT_CLOSE: &str = "</function_result>";

/// A function call parsed from model text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFunctionCall {
    /// The name of the function to call
    pub name: String,
    /// The arguments as a JSON value
    pub arguments: serde_json::Value,
    /// The raw span that was parsed, tags included
    pub raw_text: String,
}

/// Build the function-calling instructions to prepend to the system prompt.
pub fn build_function_manifest(functions: &[FunctionSchema]) -> String {
    let mut descriptions = String::new();

    for function in functions {
        descriptions.push_str(&format!("### {}\n", function.name));
        descriptions.push_str(&format!("{}\n", function.description));

        if let Some(properties) = function.parameters.properties.as_ref() {
            if !properties.is_empty() {
                descriptions.push_str("Parameters:\n");
                let required = function.parameters.required.clone().unwrap_or_default();
                let mut names: Vec<&String> = properties.keys().collect();
                names.sort();
                for name in names {
                    let schema = &properties[name];
                    let marker = if required.contains(name) {
                        "required"
                    } else {
                        "optional"
                    };
                    descriptions.push_str(&format!(
                        "  - `{}` ({}, {}): {}\n",
                        name,
                        schema.schema_type,
                        marker,
                        schema.description.as_deref().unwrap_or("")
                    ));
                }
            }
        }
        descriptions.push('\n');
    }

    format!(
        r#"## Function Calling

You can call functions. To call one, write a call in this EXACT format:

<function>function_name({{"argument": "value"}})</function>

- The arguments MUST be a single valid JSON object
- You may call several functions in one reply
- After calling functions, STOP and wait; results arrive in <function_result> blocks
- Never invent function results

## Available Functions

{descriptions}"#,
        descriptions = descriptions
    )
}

/// Encode a structured call as an embedded `<function>` span.
///
/// Arguments are re-serialized compactly when they parse as JSON.
pub fn encode_function_call(call: &FunctionCall) -> String {
    let arguments = match call.parsed_arguments() {
        Ok(value) => value.to_string(),
        Err(_) => call.arguments.clone(),
    };
    format!("{}{}({}){}", FUNCTION_OPEN, call.name, arguments, FUNCTION_CLOSE)
}

/// Encode a function response as a `<function_result>` block.
pub fn encode_function_response(response: &FunctionResponse) -> String {
    format!(
        "<function_result name=\"{}\">\n{}\n{}",
        response.name, response.text, RESULT_CLOSE
    )
}

/// Split model text into the text outside `<function>` spans and the calls.
///
/// Text outside spans is preserved verbatim and concatenated. A span whose
/// body does not parse is left in the text untouched. An unclosed span
/// (still streaming) is withheld from the text and yields no call.
pub fn parse_function_spans(text: &str) -> (String, Vec<ParsedFunctionCall>) {
    let mut cleaned = String::new();
    let mut calls = Vec::new();
    let mut remaining = text;

    while let Some(start) = remaining.find(FUNCTION_OPEN) {
        cleaned.push_str(&remaining[..start]);
        let after_open = &remaining[start + FUNCTION_OPEN.len()..];

        let Some(end) = after_open.find(FUNCTION_CLOSE) else {
            remaining = "";
            break;
        };

        let raw_end = start + FUNCTION_OPEN.len() + end + FUNCTION_CLOSE.len();
        let raw_text = &remaining[start..raw_end];
        match parse_call_body(after_open[..end].trim()) {
            Some((name, arguments)) => calls.push(ParsedFunctionCall {
                name,
                arguments,
                raw_text: raw_text.to_string(),
            }),
            None => cleaned.push_str(raw_text),
        }
        remaining = &remaining[raw_end..];
    }
    cleaned.push_str(remaining);

    (cleaned, calls)
}

/// Parse `name(json)` or a bare `name`.
fn parse_call_body(body: &str) -> Option<(String, serde_json::Value)> {
    let (name, arguments) = match body.find('(') {
        Some(paren) => {
            let inner = body[paren + 1..].trim_end().strip_suffix(')')?.trim();
            (body[..paren].trim(), inner)
        }
        None => (body, ""),
    };

    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !valid_name {
        return None;
    }

    let arguments = if arguments.is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(arguments).ok()?
    };
    Some((name.to_string(), arguments))
}

/// Lift embedded `<function>` spans of an assistant message into structured calls.
///
/// Ids are positional (`fn_0`, `fn_1`, ...) so that re-parsing a growing
/// streamed message keeps earlier calls' ids stable.
pub fn from_fake_function_message(message: TaggedMessage) -> TaggedMessage {
    if message.role != Role::Assistant {
        return message;
    }

    let (cleaned, parsed) = parse_function_spans(&message.text());
    if parsed.is_empty() && !message.text().contains(FUNCTION_OPEN) {
        return message;
    }

    let offset = message.function_calls.len();
    let mut content: Vec<ContentItem> = Vec::new();
    if !cleaned.trim().is_empty() {
        content.push(ContentItem::text(cleaned.trim_end()));
    }
    content.extend(
        message
            .content
            .into_iter()
            .filter(|item| !matches!(item, ContentItem::Text { .. })),
    );

    let mut function_calls = message.function_calls;
    function_calls.extend(parsed.into_iter().enumerate().map(|(index, call)| FunctionCall {
        id: Some(format!("fn_{}", offset + index)),
        name: call.name,
        arguments: call.arguments.to_string(),
    }));

    TaggedMessage {
        role: Role::Assistant,
        content,
        function_calls,
        function_responses: message.function_responses,
    }
}

/// Re-serialize structured function traffic into embedded text.
///
/// Assistant calls are appended to the assistant text, function-role
/// messages become user messages, and consecutive user messages are merged.
pub fn to_fake_function_messages(messages: Vec<TaggedMessage>) -> Vec<TaggedMessage> {
    let mut converted: Vec<TaggedMessage> = Vec::with_capacity(messages.len());

    for message in messages {
        let message = match message.role {
            Role::Assistant if message.has_function_calls() => {
                let mut parts: Vec<String> = Vec::new();
                let text = message.text();
                if !text.is_empty() {
                    parts.push(text);
                }
                parts.extend(message.function_calls.iter().map(encode_function_call));
                let mut content = vec![ContentItem::text(parts.join("\n"))];
                content.extend(
                    message
                        .content
                        .into_iter()
                        .filter(|item| !matches!(item, ContentItem::Text { .. })),
                );
                TaggedMessage::new(Role::Assistant, content)
            }
            Role::Function => {
                let mut content: Vec<ContentItem> = Vec::new();
                if !message.function_responses.is_empty() {
                    let blocks: Vec<String> = message
                        .function_responses
                        .iter()
                        .map(encode_function_response)
                        .collect();
                    content.push(ContentItem::text(blocks.join("\n")));
                }
                content.extend(message.content);
                TaggedMessage::new(Role::User, content)
            }
            _ => message,
        };

        match converted.last_mut() {
            Some(previous) if previous.role == Role::User && message.role == Role::User => {
                previous.content.extend(message.content);
            }
            _ => converted.push(message),
        }
    }

    converted
}
