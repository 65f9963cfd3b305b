use axum::{extract::State, routing::post, Json, Router};
use scribe::agent::Agent;
use scribe::cloud::{AiTokenClaims, CommentsOptions, ToolSelection};
use scribe::models::message::Message;
use scribe::prompt_template::load_prompt_file;
use scribe::tools::{RemoteDocument, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::chat::validate_messages;
use super::stream::{stream_reply, StreamResponse};
use super::{internal_error, RouteError};
use crate::state::AppState;

/// Author of the comments written by the agent
pub const COMMENTS_USER_ID: &str = "ai-assistant";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAgentRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub schema_awareness_data: Value,
    pub document_id: String,
    /// Keys the cached active node range, none means every request starts fresh
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Edit,
    Comments,
}

async fn build_agent(state: &AppState, request: &ServerAgentRequest, mode: Mode) -> Result<Agent, RouteError> {
    let cloud = &state.cloud;
    let claims = match mode {
        Mode::Edit => AiTokenClaims::empty(),
        Mode::Comments => cloud
            .document_claims()
            .map_err(|e| internal_error("Missing configuration", e))?,
    };
    let toolkit = cloud
        .toolkit(claims)
        .map_err(|e| internal_error("Missing configuration", e))?;
    let documents = cloud
        .documents()
        .map_err(|e| internal_error("Missing configuration", e))?;

    let selection = match mode {
        Mode::Edit => None,
        Mode::Comments => Some(ToolSelection::comments()),
    };
    let tools = toolkit
        .tools(&request.schema_awareness_data, selection)
        .await
        .map_err(|e| internal_error("Failed to fetch tools", e))?;
    let schema_awareness = toolkit
        .schema_awareness_prompt(&request.schema_awareness_data)
        .await
        .map_err(|e| internal_error("Failed to fetch schema awareness prompt", e))?;

    let mut document = RemoteDocument::new(
        Arc::new(toolkit),
        Arc::new(documents),
        request.document_id.clone(),
        request.schema_awareness_data.clone(),
    );
    if let Some(conversation_id) = &request.conversation_id {
        document = document.with_node_range(state.cursors.for_conversation(conversation_id.clone()));
    }
    if mode == Mode::Comments {
        let app_id = cloud.app_id.clone().unwrap_or_default();
        let api_secret = cloud.document_secret.clone().unwrap_or_default();
        document = document.with_comments(CommentsOptions {
            document_id: request.document_id.clone(),
            api_secret,
            user_id: COMMENTS_USER_ID.to_string(),
            app_id,
        });
    }

    let mut registry = ToolRegistry::new();
    Arc::new(document)
        .register_all(&mut registry, tools)
        .map_err(|e| internal_error("Invalid tool catalog", e))?;

    let prompt_file = match mode {
        Mode::Edit => "server_agent.md",
        Mode::Comments => "comments_agent.md",
    };
    let instructions = load_prompt_file(prompt_file, &json!({ "schema_awareness": schema_awareness }))
        .map_err(|e| internal_error("Failed to render instructions", e))?;
    let provider = state
        .fast_provider()
        .map_err(|e| internal_error("Failed to create provider", e))?;

    tracing::info!(
        "Serving document {} with {} remote tools",
        request.document_id,
        registry.len()
    );
    Ok(Agent::new(provider, instructions).with_registry(registry))
}

async fn server_agent(
    State(state): State<AppState>,
    Json(request): Json<ServerAgentRequest>,
) -> Result<StreamResponse, RouteError> {
    let agent = build_agent(&state, &request, Mode::Edit).await?;
    let messages = validate_messages(request.messages)?;
    Ok(stream_reply(agent, messages))
}

async fn server_comments(
    State(state): State<AppState>,
    Json(request): Json<ServerAgentRequest>,
) -> Result<StreamResponse, RouteError> {
    let agent = build_agent(&state, &request, Mode::Comments).await?;
    let messages = validate_messages(request.messages)?;
    Ok(stream_reply(agent, messages))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/server-agent", post(server_agent))
        .route("/api/server-comments", post(server_comments))
        .with_state(state)
}
