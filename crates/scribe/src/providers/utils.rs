use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::models::message::{Message, MessagePart};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
///
/// An assistant message that interleaves text, tool calls and tool results is split
/// into segments: text and calls are flushed as one assistant message before each run
/// of `tool` messages, so every `tool_call_id` is answered right after it is requested.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        if message.parts.is_empty() {
            let text = message.text();
            if !text.is_empty() {
                messages_spec.push(json!({
                    "role": message.role,
                    "content": text,
                }));
            }
            continue;
        }

        let mut segment = Segment::default();
        for part in &message.parts {
            match part {
                MessagePart::Text(text) => segment.text.push_str(&text.text),
                MessagePart::ToolCall(call) => segment.tool_calls.push(json!({
                    "id": call.tool_call_id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&call.tool_name),
                        "arguments": call.input.to_string(),
                    }
                })),
                MessagePart::ToolResult(result) => {
                    segment.flush(&message.role, &mut messages_spec);
                    messages_spec.push(json!({
                        "role": "tool",
                        "tool_call_id": result.tool_call_id,
                        "content": output_to_string(&result.output),
                    }));
                }
            }
        }
        segment.flush(&message.role, &mut messages_spec);
    }

    messages_spec
}

#[derive(Default)]
struct Segment {
    text: String,
    tool_calls: Vec<Value>,
}

impl Segment {
    fn flush(&mut self, role: &Role, out: &mut Vec<Value>) {
        if self.text.is_empty() && self.tool_calls.is_empty() {
            return;
        }

        let mut converted = Map::new();
        converted.insert("role".to_string(), json!(role));
        if !self.text.is_empty() {
            converted.insert("content".to_string(), json!(std::mem::take(&mut self.text)));
        }
        if !self.tool_calls.is_empty() {
            converted.insert(
                "tool_calls".to_string(),
                Value::Array(std::mem::take(&mut self.tool_calls)),
            );
        }
        out.push(Value::Object(converted));
    }
}

/// Tool outputs are opaque JSON, strings are passed through without quoting
pub fn output_to_string(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse JSON-encoded tool arguments. An empty string means no arguments; anything
/// that is not valid JSON is kept as a raw string so the tool can report it.
pub fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
        if !is_valid_function_name(&tool.name) {
            return Err(anyhow!(
                "Invalid tool name '{}', it must match [a-zA-Z0-9_-]+",
                tool.name
            ));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("No choices in response"))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let function_name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            if !is_valid_function_name(function_name) {
                tracing::warn!(
                    "Model requested tool '{}' with invalid characters in its name",
                    function_name
                );
            }
            message = message.with_tool_call(ToolCall::new(
                id,
                function_name,
                parse_arguments(arguments),
            ));
        }
    }

    Ok(message)
}

fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    re.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolResult;
    use serde_json::json;

    const OPENAI_TOOL_USE_RESPONSE: &str = r#"{
        "choices": [{
            "role": "assistant",
            "message": {
                "tool_calls": [{
                    "id": "1",
                    "function": {
                        "name": "applyDiff",
                        "arguments": "{\"delete\": \"teh\", \"insert\": \"the\"}"
                    }
                }]
            }
        }],
        "usage": {
            "input_tokens": 10,
            "output_tokens": 25,
            "total_tokens": 35
        }
    }"#;

    #[test]
    fn test_messages_to_openai_spec() -> Result<()> {
        let message = Message::user().with_text("Hello");
        let spec = messages_to_openai_spec(&[message]);

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "Hello");
        Ok(())
    }

    #[test]
    fn test_messages_with_plain_content() {
        let message = Message::user().with_content("Fix the typos");
        let spec = messages_to_openai_spec(&[message]);
        assert_eq!(spec, vec![json!({"role": "user", "content": "Fix the typos"})]);
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<()> {
        let tool = Tool::new(
            "test_tool",
            "A test tool",
            json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Test parameter"
                    }
                },
                "required": ["input"]
            }),
        );

        let spec = tools_to_openai_spec(&[tool])?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "test_tool");
        assert_eq!(spec[0]["function"]["parameters"]["required"], json!(["input"]));
        Ok(())
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("readFirstChunk"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name("hello@world"));
    }

    #[test]
    fn test_interleaved_assistant_message_is_segmented() -> Result<()> {
        let messages = vec![
            Message::user().with_text("Fix the typos"),
            Message::assistant()
                .with_text("Reading the document.")
                .with_tool_call(ToolCall::new("call_1", "readFirstChunk", json!({})))
                .with_tool_result(ToolResult::new(
                    "call_1",
                    "readFirstChunk",
                    json!("<p>teh cat</p>"),
                ))
                .with_tool_call(ToolCall::new(
                    "call_2",
                    "applyDiff",
                    json!({"delete": "teh", "insert": "the"}),
                ))
                .with_tool_result(ToolResult::new("call_2", "applyDiff", json!({"ok": true})))
                .with_text("Done."),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 6);
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["content"], "Reading the document.");
        assert_eq!(spec[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "call_1");
        assert_eq!(spec[2]["content"], "<p>teh cat</p>");
        assert!(spec[3].get("content").is_none());
        assert_eq!(
            spec[3]["tool_calls"][0]["function"]["arguments"],
            json!({"delete": "teh", "insert": "the"}).to_string()
        );
        assert_eq!(spec[4]["content"], "{\"ok\":true}");
        assert_eq!(spec[5], json!({"role": "assistant", "content": "Done."}));
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let tool = Tool::new("test_tool", "Test tool", json!({"type": "object"}));

        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
    }

    #[test]
    fn test_tools_to_openai_spec_invalid_name() {
        let tool = Tool::new("bad name", "Test tool", json!({"type": "object"}));
        assert!(tools_to_openai_spec(&[tool]).is_err());
    }

    #[test]
    fn test_tools_to_openai_spec_empty() -> Result<()> {
        let spec = tools_to_openai_spec(&[])?;
        assert!(spec.is_empty());
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_text() -> Result<()> {
        let response = json!({
            "choices": [{
                "role": "assistant",
                "message": {
                    "content": "Hello from the editor!"
                }
            }]
        });

        let message = openai_response_to_message(response)?;
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.text(), "Hello from the editor!");
        assert_eq!(message.role, Role::Assistant);

        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_valid_tool_call() -> Result<()> {
        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        let message = openai_response_to_message(response)?;

        let calls: Vec<_> = message.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_call_id, "1");
        assert_eq!(calls[0].tool_name, "applyDiff");
        assert_eq!(calls[0].input, json!({"delete": "teh", "insert": "the"}));

        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_json_decode_error() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("invalid json {");

        let message = openai_response_to_message(response)?;
        let call = message.tool_calls().next().unwrap();
        assert_eq!(call.input, json!("invalid json {"));

        Ok(())
    }

    #[test]
    fn test_openai_response_without_choices() {
        assert!(openai_response_to_message(json!({"usage": {}})).is_err());
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_arguments("{"), json!("{"));
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });

        let result = check_openai_context_length_error(&error);
        assert!(result.is_some());
        assert_eq!(
            result.unwrap().to_string(),
            "Context length exceeded. Message: This message is too long"
        );

        let error = json!({
            "code": "other_error",
            "message": "Some other error"
        });

        let result = check_openai_context_length_error(&error);
        assert!(result.is_none());
    }
}
