use super::role::Role;
use super::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Content carried inside a message, either streamed text or tool traffic
pub enum MessagePart {
    Text(TextPart),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl MessagePart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessagePart::Text(TextPart { text: text.into() })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text(part) => Some(&part.text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            MessagePart::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            MessagePart::ToolResult(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            role,
            content: None,
            parts: Vec::new(),
        }
    }

    /// Create a new, empty user message
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new, empty assistant message
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    pub fn system() -> Self {
        Self::new(Role::System)
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    /// Set the plain `content` field, used for messages that carry no parts
    pub fn with_content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }

    /// Add a text part to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_part(MessagePart::text(text))
    }

    pub fn with_tool_call(self, call: ToolCall) -> Self {
        self.with_part(MessagePart::ToolCall(call))
    }

    pub fn with_tool_result(self, result: ToolResult) -> Self {
        self.with_part(MessagePart::ToolResult(result))
    }

    /// Append streamed text to the most recent text part, opening a new text
    /// part when the last part is tool traffic.
    pub fn push_text_delta(&mut self, delta: &str) {
        if let Some(MessagePart::Text(part)) = self.parts.last_mut() {
            part.text.push_str(delta);
        } else {
            self.parts.push(MessagePart::text(delta));
        }
    }

    /// The message text: `content` if present, otherwise all text parts joined
    pub fn text(&self) -> String {
        if let Some(content) = &self.content {
            return content.clone();
        }
        self.parts
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.parts.iter().filter_map(MessagePart::as_tool_call)
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.parts.iter().filter_map(MessagePart::as_tool_result)
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    /// Tool results are routed back by call id, the output is opaque JSON
    pub fn result_for(&self, tool_call_id: &str) -> Option<&Value> {
        self.tool_results()
            .find(|result| result.tool_call_id == tool_call_id)
            .map(|result| &result.output)
    }
}
