use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::ToolHandler;
use crate::bridge::{ToolExecutor, ToolOutcome};
use crate::cloud::{
    CloudError, CommentsOptions, DocumentClient, ExecuteToolRequest, ExecuteToolResponse,
    ToolkitClient,
};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::tools::ToolRegistry;

/// Where the toolkit's active node range is kept between tool calls
#[async_trait]
pub trait NodeRangeCache: Send + Sync {
    async fn get(&self) -> Option<Value>;
    async fn set(&self, range: Option<Value>);
}

/// A document held by the collaboration service, edited through the hosted toolkit
pub struct RemoteDocument {
    toolkit: Arc<ToolkitClient>,
    documents: Arc<DocumentClient>,
    document_id: String,
    schema_awareness_data: Value,
    comments: Option<CommentsOptions>,
    node_range: Option<Arc<dyn NodeRangeCache>>,
}

impl RemoteDocument {
    pub fn new(
        toolkit: Arc<ToolkitClient>,
        documents: Arc<DocumentClient>,
        document_id: impl Into<String>,
        schema_awareness_data: Value,
    ) -> Self {
        Self {
            toolkit,
            documents,
            document_id: document_id.into(),
            schema_awareness_data,
            comments: None,
            node_range: None,
        }
    }

    pub fn with_comments(mut self, options: CommentsOptions) -> Self {
        self.comments = Some(options);
        self
    }

    pub fn with_node_range(mut self, cache: Arc<dyn NodeRangeCache>) -> Self {
        self.node_range = Some(cache);
        self
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Run a toolkit tool against the latest version of the document
    pub async fn execute(&self, tool_name: &str, input: Value) -> Result<ExecuteToolResponse, CloudError> {
        let document = self.documents.get(&self.document_id).await?;

        let range = match &self.node_range {
            Some(cache) => cache.get().await,
            None => None,
        };
        let mut request = ExecuteToolRequest::new(
            tool_name,
            input,
            document,
            self.schema_awareness_data.clone(),
        )
        .with_active_node_range(range);
        if let Some(options) = &self.comments {
            request = request.with_comments_options(options.clone());
        }

        let response = self.toolkit.execute_tool(&request).await?;
        if let Some(cache) = &self.node_range {
            if response.active_node_range.is_some() {
                cache.set(response.active_node_range.clone()).await;
            }
        }
        Ok(response)
    }

    pub async fn save(&self, document: &Value) {
        self.documents.update(&self.document_id, document).await;
    }

    /// Register every tool from the catalog as a server side tool on this document
    pub fn register_all(self: &Arc<Self>, registry: &mut ToolRegistry, tools: Vec<Tool>) -> AgentResult<()> {
        for tool in tools {
            let handler = RemoteDocumentTool::new(tool.name.clone(), self.clone());
            registry.register_handler(tool, Arc::new(handler))?;
        }
        Ok(())
    }
}

/// Executes on the client, the changed document is saved once the change is kept
#[async_trait]
impl ToolExecutor for RemoteDocument {
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutcome, AgentError> {
        let response = RemoteDocument::execute(self, &call.tool_name, call.input.clone()).await?;
        Ok(ToolOutcome {
            output: response.output,
            doc_changed: response.doc_changed,
            document: response.document,
        })
    }

    async fn commit(&self, document: Value) -> Result<(), AgentError> {
        self.save(&document).await;
        Ok(())
    }
}

/// One catalog tool executed on the server, changes are saved immediately
pub struct RemoteDocumentTool {
    name: String,
    document: Arc<RemoteDocument>,
}

impl RemoteDocumentTool {
    pub fn new(name: impl Into<String>, document: Arc<RemoteDocument>) -> Self {
        Self {
            name: name.into(),
            document,
        }
    }
}

#[async_trait]
impl ToolHandler for RemoteDocumentTool {
    async fn call(&self, input: Value) -> AgentResult<Value> {
        let response = self.document.execute(&self.name, input).await.map_err(|e| {
            tracing::error!("Failed to execute tool {}: {}", self.name, e);
            AgentError::ExecutionError(e.to_string())
        })?;

        if response.doc_changed {
            if let Some(document) = &response.document {
                self.document.save(document).await;
            }
        }
        Ok(response.output)
    }
}
