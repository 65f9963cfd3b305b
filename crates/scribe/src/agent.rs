use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolResult};
use crate::providers::base::{Provider, ProviderEvent, Usage};
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_STEPS: usize = 20;

/// Output of a reply, in the order it should reach the client
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    TextDelta(String),
    /// A call requested by the model. Client side calls end the reply, the client
    /// executes them and sends the result with its next request.
    ToolCall { call: ToolCall, client_side: bool },
    /// Result of a call the agent executed itself
    ToolResult(ToolResult),
    Finish { reason: String, usage: Usage },
}

/// Agent integrates a foundational LLM with the tools it may call
pub struct Agent {
    provider: Arc<dyn Provider>,
    instructions: String,
    registry: ToolRegistry,
    max_steps: usize,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, instructions: impl Into<String>) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
            registry: ToolRegistry::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Create a stream of events for one reply. Server side tools are executed and
    /// their results fed back to the model until it stops calling tools, asks for a
    /// client side tool, or runs out of steps.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<AgentEvent>>> {
        let mut history = messages.to_vec();
        let tools = self.registry.tools();

        Ok(Box::pin(async_stream::try_stream! {
            let mut finished = false;

            for step in 0..self.max_steps {
                let mut stream = self
                    .provider
                    .stream(&self.instructions, &history, &tools)
                    .await?;

                let mut message = Message::assistant();
                let mut calls = Vec::new();
                let mut reason = "stop".to_string();
                let mut usage = Usage::default();

                while let Some(event) = stream.next().await {
                    match event? {
                        ProviderEvent::TextDelta(delta) => {
                            message.push_text_delta(&delta);
                            yield AgentEvent::TextDelta(delta);
                        }
                        ProviderEvent::ToolCall(call) => calls.push(call),
                        ProviderEvent::Finish { reason: r, usage: u } => {
                            reason = r;
                            usage = u;
                        }
                    }
                }

                if calls.is_empty() {
                    yield AgentEvent::Finish { reason, usage };
                    finished = true;
                    break;
                }

                let mut client_calls = Vec::new();
                let mut executed = 0;
                for call in &calls {
                    message = message.with_tool_call(call.clone());
                }

                // Server calls run one at a time in request order, and their results
                // precede every client side call
                for call in calls {
                    if self.registry.is_client_side(&call.tool_name) {
                        client_calls.push(call);
                        continue;
                    }
                    yield AgentEvent::ToolCall { call: call.clone(), client_side: false };
                    let Some(output) = self.registry.dispatch(&call).await else { continue };
                    let result = ToolResult::new(&call.tool_call_id, &call.tool_name, output);
                    message = message.with_tool_result(result.clone());
                    executed += 1;
                    yield AgentEvent::ToolResult(result);
                }

                let wait_for_client = !client_calls.is_empty();
                for call in client_calls {
                    yield AgentEvent::ToolCall { call, client_side: true };
                }

                if wait_for_client {
                    yield AgentEvent::Finish { reason, usage };
                    finished = true;
                    break;
                }

                tracing::debug!("Step {} executed {} tools", step + 1, executed);
                history.push(message);
            }

            if !finished {
                tracing::warn!("Reply stopped after {} steps", self.max_steps);
                yield AgentEvent::Finish {
                    reason: "max_steps".to_string(),
                    usage: Usage::default(),
                };
            }
        }))
    }
}
