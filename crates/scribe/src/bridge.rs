//! Client side of the chat wire format.
//!
//! The bridge posts the conversation, decodes the streamed frames back into message
//! parts, and whenever the model asks for a client-side tool it cancels the read,
//! runs the tool, records the result and posts the conversation again.

pub mod frame;
pub mod session;
pub mod transport;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::errors::AgentError;
use crate::models::conversation::ConversationError;
use crate::models::tool::{ToolCall, ToolResult};
use crate::review::{ReviewError, SuggestionFeedback};

pub use frame::{encode_frame, parse_arguments, Frame, FrameDecoder};
pub use session::StreamBridge;
pub use transport::{ByteStream, ChatTransport, HttpTransport};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Cannot send a message while changes are being reviewed")]
    ReviewInProgress,
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error(transparent)]
    Review(#[from] ReviewError),
}

/// What a tool execution produced
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub output: Value,
    pub doc_changed: bool,
    /// The changed document, committed once the change is accepted
    pub document: Option<Value>,
}

impl ToolOutcome {
    pub fn output(output: Value) -> Self {
        Self {
            output,
            doc_changed: false,
            document: None,
        }
    }

    pub fn changed(output: Value, document: Value) -> Self {
        Self {
            output,
            doc_changed: true,
            document: Some(document),
        }
    }
}

/// Runs the tools the model requests from the client
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutcome, AgentError>;

    /// Persist a changed document
    async fn commit(&self, _document: Value) -> Result<(), AgentError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    Accept(Vec<SuggestionFeedback>),
    Reject(Vec<SuggestionFeedback>),
    /// Leave the review open, resolved later through the bridge
    Defer,
}

/// Decides whether a document change is kept
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, call: &ToolCall, outcome: &ToolOutcome) -> ReviewDecision;
}

/// Receives bridge activity for rendering
pub trait BridgeObserver: Send + Sync {
    fn on_text(&self, _delta: &str) {}
    fn on_tool_call(&self, _call: &ToolCall) {}
    fn on_tool_result(&self, _result: &ToolResult) {}
    fn on_error(&self, _error: &str) {}
}

pub struct NoopObserver;

impl BridgeObserver for NoopObserver {}
