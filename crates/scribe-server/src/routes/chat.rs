use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use scribe::agent::Agent;
use scribe::models::conversation::Conversation;
use scribe::models::message::Message;
use scribe::models::tool::Tool;
use scribe::prompt_template::load_prompt_file;
use scribe::tools::editor::{comment_tools, editor_tools, multi_document_tools};
use scribe::tools::ToolRegistry;
use serde::Deserialize;
use serde_json::json;

use super::stream::{stream_reply, StreamResponse};
use super::{internal_error, RouteError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub schema_awareness: Option<String>,
}

/// Reject histories where a tool result does not answer an earlier call
pub fn validate_messages(messages: Vec<Message>) -> Result<Vec<Message>, RouteError> {
    Conversation::from_messages(messages)
        .map(Conversation::into_messages)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid messages: {}", e)))
}

fn editor_agent(
    state: &AppState,
    prompt_file: &str,
    schema_awareness: Option<String>,
    tools: Vec<Tool>,
) -> Result<Agent, RouteError> {
    let instructions = load_prompt_file(prompt_file, &json!({ "schema_awareness": schema_awareness }))
        .map_err(|e| internal_error("Failed to render instructions", e))?;
    let registry = ToolRegistry::new()
        .with_tools(tools)
        .map_err(|e| internal_error("Invalid tool list", e))?;
    let provider = state
        .provider()
        .map_err(|e| internal_error("Failed to create provider", e))?;

    Ok(Agent::new(provider, instructions).with_registry(registry))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<StreamResponse, RouteError> {
    let messages = validate_messages(request.messages)?;
    let agent = editor_agent(&state, "editor_agent.md", None, editor_tools())?;
    Ok(stream_reply(agent, messages))
}

async fn multi_document(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<StreamResponse, RouteError> {
    let messages = validate_messages(request.messages)?;
    let mut tools = editor_tools();
    tools.extend(multi_document_tools());
    let agent = editor_agent(&state, "multi_document.md", None, tools)?;
    Ok(stream_reply(agent, messages))
}

async fn schema_awareness(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<StreamResponse, RouteError> {
    let messages = validate_messages(request.messages)?;
    let agent = editor_agent(
        &state,
        "editor_agent.md",
        request.schema_awareness,
        editor_tools(),
    )?;
    Ok(stream_reply(agent, messages))
}

async fn selection_awareness(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<StreamResponse, RouteError> {
    let messages = validate_messages(request.messages)?;
    let agent = editor_agent(&state, "selection_awareness.md", None, editor_tools())?;
    Ok(stream_reply(agent, messages))
}

async fn comments(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<StreamResponse, RouteError> {
    let messages = validate_messages(request.messages)?;
    let agent = editor_agent(&state, "comments.md", None, comment_tools())?;
    Ok(stream_reply(agent, messages))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/multi-document", post(multi_document))
        .route("/api/schema-awareness", post(schema_awareness))
        .route("/api/selection-awareness", post(selection_awareness))
        .route("/api/comments", post(comments))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use scribe::bridge::{Frame, FrameDecoder};
    use scribe::models::tool::{ToolCall, ToolResult};
    use serde_json::Value;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn decode(body: &str) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push(body.as_bytes());
        frames.extend(decoder.finish());
        frames
    }

    #[tokio::test]
    async fn test_chat_streams_client_tool_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&[
                        json!({"choices": [{"delta": {"content": "Reading the document."}}]}),
                        json!({"choices": [{"delta": {"tool_calls": [{
                            "index": 0,
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "readFirstChunk", "arguments": "{}"}
                        }]}}]}),
                        json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let app = routes(test_state(&server));
        let request = json!({"messages": [Message::user().with_text("Fix the typos")]});
        let response = app.oneshot(post_json("/api/chat", &request)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        let frames = decode(&body_text(response).await);

        assert_eq!(frames[0], Frame::text("Reading the document."));
        assert!(matches!(
            &frames[1],
            Frame::FunctionCall { name, call_id, status, .. }
                if name == "readFirstChunk" && call_id == "call_1" && status.as_deref() == Some("in_progress")
        ));
        assert_eq!(
            frames[2],
            Frame::Finish {
                finish_reason: Some("tool_calls".to_string())
            }
        );
        assert_eq!(frames.last(), Some(&Frame::Done));
    }

    #[tokio::test]
    async fn test_schema_awareness_is_added_to_instructions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(&[json!({"choices": [{"delta": {"content": "Done"}}]})])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let app = routes(test_state(&server));
        let request = json!({
            "messages": [Message::user().with_text("Add a callout")],
            "schemaAwareness": "Callouts are <div data-type=\"callout\">"
        });
        let response = app
            .oneshot(post_json("/api/schema-awareness", &request))
            .await
            .unwrap();
        let frames = decode(&body_text(response).await);
        assert_eq!(frames[0], Frame::text("Done"));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let system = sent["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("Callouts are <div data-type=\"callout\">"));
        assert_eq!(sent["tools"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_unanswered_tool_result_is_rejected() {
        let server = MockServer::start().await;
        let app = routes(test_state(&server));

        let orphan = Message::assistant().with_tool_result(ToolResult::new(
            "missing",
            "readSelection",
            json!({}),
        ));
        let request = json!({"messages": [Message::user().with_text("Hi"), orphan]});
        let response = app.oneshot(post_json("/api/chat", &request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_multi_document_declares_document_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(&[json!({"choices": [{"delta": {"content": "Ok"}}]})])),
            )
            .mount(&server)
            .await;

        let app = routes(test_state(&server));
        let answered = Message::assistant()
            .with_tool_call(ToolCall::new("c1", "listDocuments", json!({})))
            .with_tool_result(ToolResult::new("c1", "listDocuments", json!(["Notes"])));
        let request = json!({"messages": [Message::user().with_text("List"), answered]});
        let response = app
            .oneshot(post_json("/api/multi-document", &request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await;

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["tools"].as_array().unwrap().len(), 10);
        // The answered call is sent back to the model as a tool message
        assert_eq!(sent["messages"][3]["role"], "tool");
    }

    #[tokio::test]
    async fn test_selection_awareness_asks_for_a_summary_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(&[json!({"choices": [{"delta": {"content": "Shortening it."}}]})])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let app = routes(test_state(&server));
        let request = json!({"messages": [Message::user().with_text("Make this shorter")]});
        let response = app
            .oneshot(post_json("/api/selection-awareness", &request))
            .await
            .unwrap();
        let frames = decode(&body_text(response).await);
        assert_eq!(frames[0], Frame::text("Shortening it."));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let system = sent["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("Before calling any tools, summarize"));
        assert!(system.contains("readSelection"));
        assert_eq!(sent["tools"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_comments_streams_thread_tool_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(sse_body(&[
                    json!({"choices": [{"delta": {"tool_calls": [{
                        "index": 0,
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "getThreads", "arguments": "{}"}
                    }]}}]}),
                    json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
                ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let app = routes(test_state(&server));
        let request = json!({"messages": [Message::user().with_text("Say well done on the last paragraph")]});
        let response = app.oneshot(post_json("/api/comments", &request)).await.unwrap();
        let frames = decode(&body_text(response).await);

        assert!(matches!(
            &frames[0],
            Frame::FunctionCall { name, status, .. }
                if name == "getThreads" && status.as_deref() == Some("in_progress")
        ));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let names: Vec<&str> = sent["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["getThreads", "editThreads"]);
        let system = sent["messages"][0]["content"].as_str().unwrap();
        assert!(system.starts_with("You are an assistant that can add comments"));
    }
}
