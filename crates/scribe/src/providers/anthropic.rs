use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::AnthropicProviderConfig;
use super::utils::output_to_string;
use crate::models::message::{Message, MessagePart};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        let input_tokens = usage
            .get("input_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let output_tokens = usage
            .get("output_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    /// Tool results travel as `tool_result` blocks in a user turn, so an assistant
    /// message with interleaved results is split at each result run.
    fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
        let mut anthropic_messages: Vec<Value> = Vec::new();

        for message in messages {
            // System instructions go in the top-level field
            if message.role == Role::System {
                continue;
            }
            let role = message.role.as_str();

            if message.parts.is_empty() {
                let text = message.text();
                if !text.is_empty() {
                    push_block(role, json!({"type": "text", "text": text}), &mut anthropic_messages);
                }
                continue;
            }

            for part in &message.parts {
                match part {
                    MessagePart::Text(text) if !text.text.is_empty() => push_block(
                        role,
                        json!({"type": "text", "text": text.text}),
                        &mut anthropic_messages,
                    ),
                    MessagePart::Text(_) => {}
                    MessagePart::ToolCall(call) => push_block(
                        "assistant",
                        json!({
                            "type": "tool_use",
                            "id": call.tool_call_id,
                            "name": call.tool_name,
                            "input": call.input,
                        }),
                        &mut anthropic_messages,
                    ),
                    MessagePart::ToolResult(result) => push_block(
                        "user",
                        json!({
                            "type": "tool_result",
                            "tool_use_id": result.tool_call_id,
                            "content": output_to_string(&result.output),
                            "is_error": result.is_error(),
                        }),
                        &mut anthropic_messages,
                    ),
                }
            }
        }

        anthropic_messages
    }

    fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect()
    }

    fn response_to_message(response: &Value) -> Result<Message> {
        let blocks = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

        let mut message = Message::assistant();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        message = message.with_text(text);
                    }
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or_default();
                    let name = block["name"].as_str().unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    message = message.with_tool_call(ToolCall::new(id, name, input));
                }
                other => tracing::debug!("Skipping Anthropic content block {:?}", other),
            }
        }
        Ok(message)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let error_text = response.text().await?;
                Err(anyhow!("Request failed: {} - {}", status, error_text))
            }
        }
    }
}

/// Append a content block, merging consecutive blocks of the same role into one turn
fn push_block(role: &str, block: Value, out: &mut Vec<Value>) {
    if let Some(last) = out.last_mut() {
        if last["role"] == role {
            if let Some(content) = last["content"].as_array_mut() {
                content.push(block);
                return;
            }
        }
    }
    out.push(json!({"role": role, "content": [block]}));
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": Self::messages_to_anthropic_spec(messages),
            "max_tokens": self.config.max_tokens.unwrap_or(4096)
        });
        let obj = payload
            .as_object_mut()
            .ok_or_else(|| anyhow!("payload is not an object"))?;

        if !system.is_empty() {
            obj.insert("system".to_string(), json!(system));
        }
        if !tools.is_empty() {
            obj.insert("tools".to_string(), json!(Self::tools_to_anthropic_spec(tools)));
        }
        if let Some(temp) = self.config.temperature {
            obj.insert("temperature".to_string(), json!(temp));
        }

        let response = self.post(payload).await?;

        let message = Self::response_to_message(&response)?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolResult;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(response_body: Value) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let config = AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
        };

        let provider = AnthropicProvider::new(config).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [{
                "type": "text",
                "text": "Hello! How can I assist you today?"
            }],
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 12,
                "output_tokens": 15
            }
        });

        let (_, provider) = setup_mock_server(response_body).await;
        let messages = vec![Message::user().with_text("Hello?")];

        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await?;

        assert_eq!(message.text(), "Hello! How can I assist you today?");
        assert_eq!(usage, Usage::new(Some(12), Some(15), Some(27)));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_use_sends_system_field() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"system": "Edit documents."})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Reading."},
                    {"type": "tool_use", "id": "toolu_1", "name": "readFirstChunk", "input": {}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 3, "output_tokens": 4}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            temperature: None,
            max_tokens: Some(256),
        })?;

        let tool = Tool::new("readFirstChunk", "Read the first chunk", json!({"type": "object"}));
        let (message, _) = provider
            .complete("Edit documents.", &[Message::user().with_text("Hi")], &[tool])
            .await?;

        assert_eq!(message.text(), "Reading.");
        let call = message.tool_calls().next().expect("tool call");
        assert_eq!(call.tool_call_id, "toolu_1");
        assert_eq!(call.input, json!({}));
        Ok(())
    }

    #[test]
    fn test_tool_traffic_is_split_into_turns() {
        let messages = vec![
            Message::system().with_content("ignored here"),
            Message::user().with_text("Fix it"),
            Message::assistant()
                .with_tool_call(ToolCall::new("c1", "readFirstChunk", json!({})))
                .with_tool_result(ToolResult::new("c1", "readFirstChunk", json!("<p>x</p>")))
                .with_text("Done"),
        ];

        let spec = AnthropicProvider::messages_to_anthropic_spec(&messages);
        assert_eq!(spec.len(), 4);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[1]["content"][0]["type"], "tool_use");
        assert_eq!(spec[2]["role"], "user");
        assert_eq!(spec[2]["content"][0]["tool_use_id"], "c1");
        assert_eq!(spec[2]["content"][0]["content"], "<p>x</p>");
        assert_eq!(spec[3]["role"], "assistant");
        assert_eq!(spec[3]["content"][0]["text"], "Done");
    }

    #[tokio::test]
    async fn test_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529))
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "k".to_string(),
            model: "m".to_string(),
            temperature: None,
            max_tokens: None,
        })
        .unwrap();

        let err = provider.complete("", &[], &[]).await.unwrap_err();
        assert!(err.to_string().contains("Server error"));
    }
}
