//! Tools offered to the model.
//!
//! A registered tool either has a handler, in which case the agent runs it on the
//! server, or it is declared only and the client executes it when the call arrives
//! through the chat stream.

pub mod editor;
pub mod remote;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

pub use remote::{NodeRangeCache, RemoteDocument, RemoteDocumentTool};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value) -> AgentResult<Value>;
}

struct Entry {
    tool: Tool,
    handler: Option<Arc<dyn ToolHandler>>,
}

/// Tools in registration order, names are unique
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a tool the client executes
    pub fn register(&mut self, tool: Tool) -> AgentResult<()> {
        self.insert(tool, None)
    }

    pub fn register_handler(&mut self, tool: Tool, handler: Arc<dyn ToolHandler>) -> AgentResult<()> {
        self.insert(tool, Some(handler))
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> AgentResult<Self> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(self)
    }

    fn insert(&mut self, tool: Tool, handler: Option<Arc<dyn ToolHandler>>) -> AgentResult<()> {
        if self.contains(&tool.name) {
            return Err(AgentError::Internal(format!(
                "Tool {} is already registered",
                tool.name
            )));
        }
        self.entries.push(Entry { tool, handler });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.tool.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.entries.iter().map(|e| e.tool.clone()).collect()
    }

    /// True when the named tool is executed by the client
    pub fn is_client_side(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.tool.name == name && e.handler.is_none())
    }

    /// Run a server side tool. Failures become the `{ error }` output so the model
    /// can report them. `None` means the client must execute the call.
    pub async fn dispatch(&self, call: &ToolCall) -> Option<Value> {
        let entry = match self.entries.iter().find(|e| e.tool.name == call.tool_name) {
            Some(entry) => entry,
            None => {
                let err = AgentError::ToolNotFound(call.tool_name.clone());
                return Some(err.to_tool_output());
            }
        };
        let handler = entry.handler.as_ref()?;

        match handler.call(call.input.clone()).await {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", call.tool_name, e);
                Some(e.to_tool_output())
            }
        }
    }
}
