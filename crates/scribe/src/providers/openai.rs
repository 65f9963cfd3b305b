use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::base::{Provider, ProviderEvent, ProviderStream, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
    parse_arguments, tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::sse::{SseDecoder, SseEvent};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage").filter(|u| !u.is_null()) else {
            return Usage::default();
        };

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn build_payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let mut messages_array = Vec::new();
        if !system.is_empty() {
            messages_array.push(json!({
                "role": "system",
                "content": system
            }));
        }
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array
        });
        let obj = payload
            .as_object_mut()
            .ok_or_else(|| anyhow!("payload is not an object"))?;

        if !tools.is_empty() {
            obj.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            obj.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            obj.insert("max_completion_tokens".to_string(), json!(tokens));
        }
        if let Some(effort) = &self.config.reasoning_effort {
            obj.insert("reasoning_effort".to_string(), json!(effort));
        }

        Ok(payload)
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(err) = body
                    .get("error")
                    .and_then(check_openai_context_length_error)
                {
                    return Err(err.into());
                }
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools)?;
        let response: Value = self.send(&payload).await?.json().await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let message = openai_response_to_message(response.clone())?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream> {
        let mut payload = self.build_payload(system, messages, tools)?;
        payload["stream"] = json!(true);
        payload["stream_options"] = json!({"include_usage": true});

        let response = self.send(&payload).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut decoder = SseDecoder::new();
            let mut state = StreamState::default();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk?;
                for event in decoder.push(&chunk) {
                    match event {
                        SseEvent::Done => break 'read,
                        SseEvent::Data(data) => {
                            for out in state.apply(&data)? {
                                yield out;
                            }
                        }
                    }
                }
            }
            for event in decoder.finish() {
                if let SseEvent::Data(data) = event {
                    for out in state.apply(&data)? {
                        yield out;
                    }
                }
            }

            for out in state.finish() {
                yield out;
            }
        };

        Ok(stream.boxed())
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates streamed chunks. Tool call fragments are keyed by their index and only
/// emitted once the stream ends, when their arguments are complete.
#[derive(Debug, Default)]
struct StreamState {
    tool_calls: BTreeMap<u64, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Usage,
}

impl StreamState {
    fn apply(&mut self, data: &str) -> Result<Vec<ProviderEvent>> {
        let chunk: Value = serde_json::from_str(data)
            .map_err(|e| anyhow!("Invalid stream chunk {}: {}", data, e))?;

        if let Some(error) = chunk.get("error") {
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let mut events = Vec::new();
        if chunk.get("usage").is_some_and(|u| !u.is_null()) {
            self.usage = OpenAiProvider::get_usage(&chunk);
        }

        let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
            return Ok(events);
        };

        if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
            self.finish_reason = Some(reason.to_string());
        }

        let delta = &choice["delta"];
        if let Some(text) = delta.get("content").and_then(|t| t.as_str()) {
            if !text.is_empty() {
                events.push(ProviderEvent::TextDelta(text.to_string()));
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = call.get("id").and_then(|i| i.as_str()) {
                    entry.id = id.to_string();
                }
                if let Some(name) = call["function"].get("name").and_then(|n| n.as_str()) {
                    entry.name.push_str(name);
                }
                if let Some(args) = call["function"].get("arguments").and_then(|a| a.as_str()) {
                    entry.arguments.push_str(args);
                }
            }
        }

        Ok(events)
    }

    fn finish(&mut self) -> Vec<ProviderEvent> {
        let mut events: Vec<ProviderEvent> = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|call| {
                ProviderEvent::ToolCall(ToolCall::new(
                    call.id,
                    call.name,
                    parse_arguments(&call.arguments),
                ))
            })
            .collect();

        let reason = self.finish_reason.take().unwrap_or_else(|| {
            if events.is_empty() {
                "stop".to_string()
            } else {
                "tool_calls".to_string()
            }
        });
        events.push(ProviderEvent::Finish {
            reason,
            usage: std::mem::take(&mut self.usage),
        });
        events
    }
}
