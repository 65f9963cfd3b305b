use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

use super::frame::{parse_arguments, Frame, FrameDecoder, STATUS_COMPLETED, STATUS_IN_PROGRESS};
use super::transport::ChatTransport;
use super::{
    BridgeError, BridgeObserver, NoopObserver, ReviewDecision, Reviewer, ToolExecutor,
    ToolOutcome,
};
use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolResult};
use crate::review::{ReviewGate, SuggestionFeedback};

pub const DEFAULT_MAX_ROUND_TRIPS: usize = 20;

/// How a single read of the response stream ended
#[derive(Debug)]
enum Step {
    Complete,
    /// A tool ran and the conversation must be posted again
    RoundTrip,
    AwaitingReview,
}

/// A change waiting for the review gate to close
#[derive(Debug)]
struct PendingChange {
    message_id: String,
    document: Option<Value>,
}

pub struct StreamBridge {
    transport: Arc<dyn ChatTransport>,
    executor: Arc<dyn ToolExecutor>,
    reviewer: Option<Arc<dyn Reviewer>>,
    observer: Arc<dyn BridgeObserver>,
    conversation: Conversation,
    gate: ReviewGate,
    pending: Option<PendingChange>,
    max_round_trips: usize,
}

impl StreamBridge {
    pub fn new(transport: Arc<dyn ChatTransport>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            transport,
            executor,
            reviewer: None,
            observer: Arc::new(NoopObserver),
            conversation: Conversation::new(),
            gate: ReviewGate::new(),
            pending: None,
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
        }
    }

    /// Route document changes through a reviewer before they are committed
    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_max_round_trips(mut self, max_round_trips: usize) -> Self {
        self.max_round_trips = max_round_trips;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn review_gate(&self) -> &ReviewGate {
        &self.gate
    }

    pub fn can_send(&self) -> bool {
        self.gate.can_send()
    }

    /// Append a user message and run the conversation until the model stops asking
    /// for tools. Request failures end up in the conversation as an error message.
    pub async fn send(&mut self, text: &str) -> Result<(), BridgeError> {
        if !self.gate.can_send() {
            return Err(BridgeError::ReviewInProgress);
        }
        self.conversation.push(Message::user().with_text(text))?;
        self.run().await;
        Ok(())
    }

    pub fn record_feedback(&mut self, feedback: SuggestionFeedback) -> Result<(), BridgeError> {
        self.gate.record_feedback(feedback)?;
        Ok(())
    }

    /// Close an open review keeping the change, then continue the conversation
    pub async fn accept_all(&mut self) -> Result<(), BridgeError> {
        self.close_review(true).await?;
        self.run().await;
        Ok(())
    }

    /// Close an open review discarding the change, then continue the conversation
    pub async fn reject_all(&mut self) -> Result<(), BridgeError> {
        self.close_review(false).await?;
        self.run().await;
        Ok(())
    }

    async fn run(&mut self) {
        let mut round_trips = 0;
        loop {
            match self.read_once().await {
                Ok(Step::Complete) | Ok(Step::AwaitingReview) => break,
                Ok(Step::RoundTrip) => {
                    round_trips += 1;
                    if round_trips >= self.max_round_trips {
                        tracing::warn!("Stopping after {} tool round trips", round_trips);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Chat request failed: {}", e);
                    self.observer.on_error(&e.to_string());
                    let message = Message::assistant().with_text(format!("Error: {}", e));
                    if let Err(e) = self.conversation.push(message) {
                        tracing::error!("Could not record error message: {}", e);
                    }
                    break;
                }
            }
        }
    }

    /// The id of the assistant message frames are appended to, opened if needed
    fn open_assistant(&mut self) -> Result<String, BridgeError> {
        if let Some(message) = self.conversation.open_assistant() {
            return Ok(message.id.clone());
        }
        let message = Message::assistant();
        let id = message.id.clone();
        self.conversation.push(message)?;
        Ok(id)
    }

    async fn read_once(&mut self) -> Result<Step, BridgeError> {
        let mut body = self.transport.send(self.conversation.messages()).await?;
        let message_id = self.open_assistant()?;
        let mut decoder = FrameDecoder::new();

        // The read only completes when the body ends, sentinel lines are skipped
        while let Some(chunk) = body.next().await {
            let frames = decoder.push(&chunk?);
            if let Some(call) = self.dispatch(&message_id, frames)? {
                // Cancel the current read before the tool runs
                drop(body);
                return self.execute(&message_id, call).await;
            }
        }

        let frames = decoder.finish();
        match self.dispatch(&message_id, frames)? {
            Some(call) => self.execute(&message_id, call).await,
            None => Ok(Step::Complete),
        }
    }

    /// Apply frames in order, stopping at the first client-side tool call
    fn dispatch(&mut self, message_id: &str, frames: Vec<Frame>) -> Result<Option<ToolCall>, BridgeError> {
        for frame in frames {
            match frame {
                Frame::Text(delta) => {
                    self.conversation.push_text_delta(message_id, &delta)?;
                    self.observer.on_text(&delta);
                }
                Frame::FunctionCall {
                    name,
                    call_id,
                    arguments,
                    status,
                } => {
                    if self.conversation.contains_tool_call(&call_id) {
                        tracing::debug!("Ignoring repeated frame for tool call {}", call_id);
                        continue;
                    }
                    let call = ToolCall::new(call_id, name, parse_arguments(&arguments));
                    match status.as_deref() {
                        None | Some(STATUS_IN_PROGRESS) => {
                            self.conversation.push_tool_call(message_id, call.clone())?;
                            self.observer.on_tool_call(&call);
                            return Ok(Some(call));
                        }
                        // Executed server side, the output follows in its own frame
                        Some(STATUS_COMPLETED) => {
                            self.conversation.push_tool_call(message_id, call.clone())?;
                            self.observer.on_tool_call(&call);
                        }
                        Some(other) => {
                            tracing::warn!(
                                "Dropping tool call {} with status {}",
                                call.tool_call_id,
                                other
                            );
                        }
                    }
                }
                Frame::FunctionCallOutput { call_id, output } => {
                    let Some(call) = self
                        .conversation
                        .pending_tool_calls()
                        .into_iter()
                        .find(|call| call.tool_call_id == call_id)
                        .cloned()
                    else {
                        tracing::warn!("Ignoring output for unknown or answered call {}", call_id);
                        continue;
                    };
                    let result = ToolResult::new(call.tool_call_id, call.tool_name, output);
                    self.conversation
                        .push_tool_result(message_id, result.clone())?;
                    self.observer.on_tool_result(&result);
                }
                Frame::Error(error) => {
                    tracing::warn!("Error frame in chat stream: {}", error);
                    self.observer.on_error(&error);
                }
                Frame::Finish { finish_reason } => {
                    tracing::debug!("Chat stream finished: {:?}", finish_reason);
                }
                Frame::Other(payload) => {
                    tracing::debug!("Ignoring unknown frame {}", payload);
                }
                Frame::Done => {}
            }
        }
        Ok(None)
    }

    async fn execute(&mut self, message_id: &str, call: ToolCall) -> Result<Step, BridgeError> {
        let outcome = match self.executor.execute(&call).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", call.tool_name, e);
                ToolOutcome::output(e.to_tool_output())
            }
        };

        if !outcome.doc_changed {
            self.record_result(message_id, &call, outcome.output)?;
            return Ok(Step::RoundTrip);
        }

        let Some(reviewer) = self.reviewer.clone() else {
            if let Some(document) = outcome.document {
                self.commit(document).await;
            }
            self.record_result(message_id, &call, outcome.output)?;
            return Ok(Step::RoundTrip);
        };

        self.gate
            .begin(&call.tool_name, &call.tool_call_id, outcome.output.clone())?;
        self.pending = Some(PendingChange {
            message_id: message_id.to_string(),
            document: outcome.document.clone(),
        });

        let accepted = match reviewer.review(&call, &outcome).await {
            ReviewDecision::Defer => return Ok(Step::AwaitingReview),
            ReviewDecision::Accept(feedback) => {
                self.record_all(feedback)?;
                true
            }
            ReviewDecision::Reject(feedback) => {
                self.record_all(feedback)?;
                false
            }
        };
        self.close_review(accepted).await?;
        Ok(Step::RoundTrip)
    }

    fn record_all(&mut self, feedback: Vec<SuggestionFeedback>) -> Result<(), BridgeError> {
        for item in feedback {
            self.gate.record_feedback(item)?;
        }
        Ok(())
    }

    async fn close_review(&mut self, accepted: bool) -> Result<(), BridgeError> {
        let resolution = if accepted {
            self.gate.accept_all()?
        } else {
            self.gate.reject_all()?
        };
        let pending = self.pending.take();

        if resolution.accepted {
            if let Some(document) = pending.as_ref().and_then(|p| p.document.clone()) {
                self.commit(document).await;
            }
        }

        let message_id = match pending {
            Some(pending) => pending.message_id,
            None => self.open_assistant()?,
        };
        let result = ToolResult::new(
            resolution.tool_call_id,
            resolution.tool_name,
            resolution.output,
        );
        self.conversation.push_tool_result(&message_id, result.clone())?;
        self.observer.on_tool_result(&result);
        Ok(())
    }

    async fn commit(&self, document: Value) {
        if let Err(e) = self.executor.commit(document).await {
            tracing::error!("Failed to commit document: {}", e);
            self.observer.on_error(&e.to_string());
        }
    }

    fn record_result(&mut self, message_id: &str, call: &ToolCall, output: Value) -> Result<(), BridgeError> {
        let result = ToolResult::new(&call.tool_call_id, &call.tool_name, output);
        self.conversation.push_tool_result(message_id, result.clone())?;
        self.observer.on_tool_result(&result);
        Ok(())
    }
}
