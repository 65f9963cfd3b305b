use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Incremental output of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    TextDelta(String),
    /// A tool call whose arguments are complete
    ToolCall(ToolCall),
    Finish { reason: String, usage: Usage },
}

pub type ProviderStream = BoxStream<'static, Result<ProviderEvent>>;

/// Base trait for AI providers (OpenAI, Anthropic, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message using the configured model
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)>;

    /// Stream the next message. Providers without a native streaming mode fall back
    /// to a single completion replayed as events.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream> {
        let (message, usage) = self.complete(system, messages, tools).await?;
        Ok(stream::iter(message_to_events(&message, usage).into_iter().map(Ok)).boxed())
    }
}

pub fn message_to_events(message: &Message, usage: Usage) -> Vec<ProviderEvent> {
    let mut events = Vec::new();
    let text = message.text();
    if !text.is_empty() {
        events.push(ProviderEvent::TextDelta(text));
    }
    for call in message.tool_calls() {
        events.push(ProviderEvent::ToolCall(call.clone()));
    }
    let reason = if message.has_tool_calls() {
        "tool_calls"
    } else {
        "stop"
    };
    events.push(ProviderEvent::Finish {
        reason: reason.to_string(),
        usage,
    });
    events
}
