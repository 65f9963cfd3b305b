use super::message::{Message, MessagePart};
use super::role::Role;
use super::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversationError {
    #[error("tool result for unknown tool call {0}")]
    UnknownToolCall(String),

    #[error("tool call {0} is already part of the conversation")]
    DuplicateToolCall(String),

    #[error("tool call {0} already has a result")]
    DuplicateToolResult(String),

    #[error("message {0} not found")]
    MessageNotFound(String),
}

/// An append-only list of messages that keeps tool calls and tool results paired.
///
/// A `tool_result` part is only accepted once a `tool_call` part with the same id
/// exists in the same or an earlier message, and each call id appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a conversation from client supplied messages, validating tool pairing
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, ConversationError> {
        let mut conversation = Self::new();
        for message in messages {
            conversation.push(message)?;
        }
        Ok(conversation)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) -> Result<(), ConversationError> {
        let mut calls = self.call_ids();
        let mut results = self.result_ids();
        for part in &message.parts {
            match part {
                MessagePart::ToolCall(call) => {
                    if !calls.insert(call.tool_call_id.clone()) {
                        return Err(ConversationError::DuplicateToolCall(call.tool_call_id.clone()));
                    }
                }
                MessagePart::ToolResult(result) => {
                    if !calls.contains(&result.tool_call_id) {
                        return Err(ConversationError::UnknownToolCall(result.tool_call_id.clone()));
                    }
                    if !results.insert(result.tool_call_id.clone()) {
                        return Err(ConversationError::DuplicateToolResult(
                            result.tool_call_id.clone(),
                        ));
                    }
                }
                MessagePart::Text(_) => {}
            }
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn push_text_delta(&mut self, message_id: &str, delta: &str) -> Result<(), ConversationError> {
        self.message_mut(message_id)?.push_text_delta(delta);
        Ok(())
    }

    pub fn push_tool_call(&mut self, message_id: &str, call: ToolCall) -> Result<(), ConversationError> {
        if self.call_ids().contains(&call.tool_call_id) {
            return Err(ConversationError::DuplicateToolCall(call.tool_call_id));
        }
        self.message_mut(message_id)?
            .parts
            .push(MessagePart::ToolCall(call));
        Ok(())
    }

    pub fn push_tool_result(
        &mut self,
        message_id: &str,
        result: ToolResult,
    ) -> Result<(), ConversationError> {
        let position = self
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| ConversationError::MessageNotFound(message_id.to_string()))?;

        // The call must live in this message or an earlier one
        let known = self.messages[..=position]
            .iter()
            .flat_map(|m| m.tool_calls())
            .any(|call| call.tool_call_id == result.tool_call_id);
        if !known {
            return Err(ConversationError::UnknownToolCall(result.tool_call_id));
        }
        if self.result_ids().contains(&result.tool_call_id) {
            return Err(ConversationError::DuplicateToolResult(result.tool_call_id));
        }

        self.messages[position]
            .parts
            .push(MessagePart::ToolResult(result));
        Ok(())
    }

    pub fn contains_tool_call(&self, tool_call_id: &str) -> bool {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls())
            .any(|call| call.tool_call_id == tool_call_id)
    }

    /// Tool calls that do not have a result yet, in the order they were made
    pub fn pending_tool_calls(&self) -> Vec<&ToolCall> {
        let results = self.result_ids();
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls())
            .filter(|call| !results.contains(&call.tool_call_id))
            .collect()
    }

    /// The last message if it is an assistant message
    pub fn open_assistant(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.role == Role::Assistant)
    }

    fn message_mut(&mut self, message_id: &str) -> Result<&mut Message, ConversationError> {
        self.messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| ConversationError::MessageNotFound(message_id.to_string()))
    }

    fn call_ids(&self) -> HashSet<String> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls())
            .map(|call| call.tool_call_id.clone())
            .collect()
    }

    fn result_ids(&self) -> HashSet<String> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_results())
            .map(|result| result.tool_call_id.clone())
            .collect()
    }
}
