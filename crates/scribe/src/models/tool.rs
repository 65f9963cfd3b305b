use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema of the input the tool accepts
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A structured request from the model to invoke a named tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Unique within a conversation
    pub tool_call_id: String,
    pub tool_name: String,
    /// Opaque JSON matching the tool's declared schema
    pub input: Value,
}

impl ToolCall {
    pub fn new<I: Into<String>, N: Into<String>>(tool_call_id: I, tool_name: N, input: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }
}

/// The value returned to the model after executing a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: Value,
}

impl ToolResult {
    pub fn new<I: Into<String>, N: Into<String>>(tool_call_id: I, tool_name: N, output: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output,
        }
    }

    /// True when the output is the `{ error }` shape produced for failed tools
    pub fn is_error(&self) -> bool {
        self.output
            .as_object()
            .map(|obj| obj.len() == 1 && obj.contains_key("error"))
            .unwrap_or(false)
    }
}
