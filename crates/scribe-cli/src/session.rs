use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use console::style;
use scribe::bridge::{HttpTransport, StreamBridge, ToolExecutor, ToolOutcome};
use scribe::cloud::AiTokenClaims;
use scribe::errors::AgentError;
use scribe::models::tool::ToolCall;
use scribe::tools::RemoteDocument;
use serde_json::{json, Value};

use crate::cloud::CloudArgs;
use crate::prompt::{get_input, ConsoleObserver, CliclackReviewer, InputType};

/// Stands in when no remote document is configured, every call fails so the
/// model can tell the user
pub struct NoDocument;

#[async_trait]
impl ToolExecutor for NoDocument {
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutcome, AgentError> {
        Err(AgentError::ToolNotFound(format!(
            "{} (no document is open in this session)",
            call.tool_name
        )))
    }
}

pub struct SessionOptions {
    pub url: String,
    pub document_id: Option<String>,
    pub conversation_id: Option<String>,
    pub schema_awareness_data: Value,
    pub review: bool,
    pub max_round_trips: usize,
}

/// Build the executor for client-side tools, a remote document when one is configured
pub fn executor(cloud: &CloudArgs, options: &SessionOptions) -> Result<Arc<dyn ToolExecutor>> {
    let document_id = match &options.document_id {
        Some(id) if cloud.has_toolkit() => id,
        _ => return Ok(Arc::new(NoDocument)),
    };

    let document = RemoteDocument::new(
        Arc::new(cloud.toolkit(AiTokenClaims::empty())?),
        Arc::new(cloud.documents()?),
        document_id.clone(),
        options.schema_awareness_data.clone(),
    );
    Ok(Arc::new(document))
}

pub fn bridge(executor: Arc<dyn ToolExecutor>, options: &SessionOptions) -> Result<StreamBridge> {
    let mut transport = HttpTransport::new(&options.url)?;
    if let Some(document_id) = &options.document_id {
        transport = transport.with_field("documentId", json!(document_id));
    }
    if let Some(conversation_id) = &options.conversation_id {
        transport = transport.with_field("conversationId", json!(conversation_id));
    }
    if !options.schema_awareness_data.is_null() {
        transport = transport.with_field("schemaAwarenessData", options.schema_awareness_data.clone());
    }

    let mut bridge = StreamBridge::new(Arc::new(transport), executor)
        .with_observer(Arc::new(ConsoleObserver))
        .with_max_round_trips(options.max_round_trips);
    if options.review {
        bridge = bridge.with_reviewer(Arc::new(CliclackReviewer));
    }
    Ok(bridge)
}

pub struct Session {
    bridge: StreamBridge,
}

impl Session {
    pub fn new(bridge: StreamBridge) -> Self {
        Self { bridge }
    }

    pub async fn start(&mut self) -> Result<()> {
        println!(
            "Scribe chat {}",
            style("- type \"/exit\" to end the session, \"/?\" for help").dim()
        );
        println!();

        loop {
            let result = match get_input()? {
                InputType::Exit => break,
                InputType::Message(_) if !self.bridge.can_send() => {
                    println!(
                        "{}",
                        style("A change is waiting for review, use /accept or /reject first").yellow()
                    );
                    continue;
                }
                InputType::Message(text) => self.bridge.send(&text).await,
                InputType::AcceptAll => self.bridge.accept_all().await,
                InputType::RejectAll => self.bridge.reject_all().await,
            };

            if let Err(e) = result {
                println!("{}", style(e.to_string()).red());
            }
            println!();
        }

        tracing::debug!(
            "Session ended after {} messages",
            self.bridge.messages().len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe::bridge::{encode_frame, Frame};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(server: &MockServer) -> SessionOptions {
        SessionOptions {
            url: format!("{}/api/chat", server.uri()),
            document_id: Some("doc-1".to_string()),
            conversation_id: None,
            schema_awareness_data: Value::Null,
            review: false,
            max_round_trips: 20,
        }
    }

    #[tokio::test]
    async fn test_without_document_tools_report_an_error() {
        let server = MockServer::start().await;
        let first: String = [
            Frame::function_call("readFirstChunk", "call_1", &json!({})),
            Frame::Done,
        ]
        .iter()
        .map(encode_frame)
        .collect();
        let second: String = [Frame::text("No document."), Frame::Done]
            .iter()
            .map(encode_frame)
            .collect();

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"documentId": "doc-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(first))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(second))
            .mount(&server)
            .await;

        let options = options(&server);
        let executor = executor(&CloudArgs::default(), &options).unwrap();
        let mut bridge = bridge(executor, &options).unwrap();
        bridge.send("Read it").await.unwrap();

        let messages = bridge.messages();
        assert_eq!(messages.len(), 2);
        let output = messages[1].result_for("call_1").unwrap();
        assert!(output["error"]
            .as_str()
            .unwrap()
            .contains("no document is open"));
        assert_eq!(messages[1].text(), "No document.");
    }
}
