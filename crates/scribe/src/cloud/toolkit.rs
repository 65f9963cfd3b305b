use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::jwt::{mint_token, AiTokenClaims};
use super::CloudError;
use crate::models::tool::Tool;

pub const DEFAULT_API_URL: &str = "https://api.tiptap.dev/v3/ai";
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Which tool families the catalog returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSelection {
    pub tiptap_read: bool,
    pub tiptap_edit: bool,
    pub get_threads: bool,
    pub edit_threads: bool,
}

impl ToolSelection {
    /// Comment tools only, the document itself is read only
    pub fn comments() -> Self {
        Self {
            tiptap_read: false,
            tiptap_edit: false,
            get_threads: true,
            edit_threads: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsOptions {
    pub document_id: String,
    pub api_secret: String,
    pub user_id: String,
    pub app_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteToolRequest {
    pub tool_name: String,
    pub input: Value,
    pub document: Value,
    pub schema_awareness_data: Value,
    #[serde(
        rename = "experimental__commentsOptions",
        skip_serializing_if = "Option::is_none"
    )]
    pub comments_options: Option<CommentsOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_node_range: Option<Value>,
}

impl ExecuteToolRequest {
    pub fn new(
        tool_name: impl Into<String>,
        input: Value,
        document: Value,
        schema_awareness_data: Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            input,
            document,
            schema_awareness_data,
            comments_options: None,
            active_node_range: None,
        }
    }

    pub fn with_comments_options(mut self, options: CommentsOptions) -> Self {
        self.comments_options = Some(options);
        self
    }

    pub fn with_active_node_range(mut self, range: Option<Value>) -> Self {
        self.active_node_range = range;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteToolResponse {
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub doc_changed: bool,
    #[serde(default)]
    pub document: Option<Value>,
    #[serde(default)]
    pub active_node_range: Option<Value>,
}

#[derive(Deserialize)]
struct ToolsResponse {
    tools: Vec<Tool>,
}

#[derive(Deserialize)]
struct PromptResponse {
    prompt: String,
}

/// Client for the hosted AI toolkit API
#[derive(Debug, Clone)]
pub struct ToolkitClient {
    client: Client,
    api_url: String,
    app_id: String,
    secret: String,
    origin: String,
    claims: AiTokenClaims,
}

impl ToolkitClient {
    pub fn new(
        api_url: impl Into<String>,
        app_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, CloudError> {
        let app_id = app_id.into();
        if app_id.is_empty() {
            return Err(CloudError::MissingConfig("AI app id".to_string()));
        }

        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            app_id,
            secret: secret.into(),
            origin: DEFAULT_ORIGIN.to_string(),
            claims: AiTokenClaims::empty(),
        })
    }

    /// Origin header sent with every request, it must be allowed by the hosted app
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Extra claims minted into every token, used by the comment tools
    pub fn with_claims(mut self, claims: AiTokenClaims) -> Self {
        self.claims = claims;
        self
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &Value,
        context: &str,
    ) -> Result<T, CloudError> {
        let token = mint_token(&self.secret, &self.claims)?;
        let response = self
            .client
            .post(format!("{}{}", self.api_url, endpoint))
            .bearer_auth(token)
            .header("X-App-Id", &self.app_id)
            .header("Origin", &self.origin)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CloudError::Status {
                context: context.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse(format!("{}: {}", context, e)))
    }

    /// Fetch the tool catalog. `None` keeps the service defaults.
    pub async fn tools(
        &self,
        schema_awareness_data: &Value,
        selection: Option<ToolSelection>,
    ) -> Result<Vec<Tool>, CloudError> {
        let mut body = json!({ "schemaAwarenessData": schema_awareness_data });
        if let Some(selection) = selection {
            body["tools"] = json!(selection);
        }

        let response: ToolsResponse = self
            .post("/toolkit/tools", &body, "Failed to fetch tools")
            .await?;
        tracing::debug!("Fetched {} toolkit tools", response.tools.len());
        Ok(response.tools)
    }

    pub async fn schema_awareness_prompt(
        &self,
        schema_awareness_data: &Value,
    ) -> Result<String, CloudError> {
        let body = json!({ "schemaAwarenessData": schema_awareness_data });
        let response: PromptResponse = self
            .post(
                "/toolkit/schema-awareness-prompt",
                &body,
                "Failed to fetch schema awareness prompt",
            )
            .await?;
        Ok(response.prompt)
    }

    pub async fn execute_tool(
        &self,
        request: &ExecuteToolRequest,
    ) -> Result<ExecuteToolResponse, CloudError> {
        let body = serde_json::to_value(request)
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;
        self.post("/toolkit/execute-tool", &body, "Tool execution failed")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ToolkitClient {
        ToolkitClient::new(server.uri(), "app-1", "ai-secret").unwrap()
    }

    #[tokio::test]
    async fn test_tools_sends_selection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/toolkit/tools"))
            .and(header("X-App-Id", "app-1"))
            .and(header("Origin", DEFAULT_ORIGIN))
            .and(header_exists("Authorization"))
            .and(body_partial_json(json!({
                "schemaAwarenessData": {"nodes": ["paragraph"]},
                "tools": {"tiptapRead": false, "tiptapEdit": false, "getThreads": true, "editThreads": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tools": [{
                    "name": "getThreads",
                    "description": "List comment threads",
                    "inputSchema": {"type": "object"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tools = client_for(&server)
            .tools(&json!({"nodes": ["paragraph"]}), Some(ToolSelection::comments()))
            .await
            .unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "getThreads");
        assert_eq!(tools[0].input_schema, json!({"type": "object"}));
    }

    #[tokio::test]
    async fn test_schema_awareness_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/toolkit/schema-awareness-prompt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"prompt": "Use <p> for text."})),
            )
            .mount(&server)
            .await;

        let prompt = client_for(&server)
            .schema_awareness_prompt(&json!({}))
            .await
            .unwrap();
        assert_eq!(prompt, "Use <p> for text.");
    }

    #[tokio::test]
    async fn test_execute_tool_with_comments_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/toolkit/execute-tool"))
            .and(body_partial_json(json!({
                "toolName": "editThreads",
                "experimental__commentsOptions": {
                    "documentId": "doc-1",
                    "apiSecret": "doc-secret",
                    "userId": "ai-assistant",
                    "appId": "cloud-app"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": "Added 1 thread",
                "docChanged": true,
                "document": {"type": "doc"}
            })))
            .mount(&server)
            .await;

        let request = ExecuteToolRequest::new("editThreads", json!({}), json!({}), json!({}))
            .with_comments_options(CommentsOptions {
                document_id: "doc-1".to_string(),
                api_secret: "doc-secret".to_string(),
                user_id: "ai-assistant".to_string(),
                app_id: "cloud-app".to_string(),
            });
        let response = client_for(&server).execute_tool(&request).await.unwrap();

        assert_eq!(response.output, json!("Added 1 thread"));
        assert!(response.doc_changed);
        assert_eq!(response.document, Some(json!({"type": "doc"})));
        assert_eq!(response.active_node_range, None);
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        match client_for(&server).schema_awareness_prompt(&json!({})).await {
            Err(CloudError::Status { status, .. }) => assert_eq!(status, 401),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_app_id() {
        assert!(matches!(
            ToolkitClient::new(DEFAULT_API_URL, "", "secret"),
            Err(CloudError::MissingConfig(_))
        ));
    }
}
